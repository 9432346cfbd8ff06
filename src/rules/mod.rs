//! Detection rule acquisition and compilation.
//!
//! Rules live on a central repository and are pulled by name at the start of
//! every scan, parsed from their text form, and compiled exactly once into
//! an immutable matcher shared by whichever engine runs.

pub mod engine;
pub mod fetch;
pub mod source;

pub use engine::{CompiledRule, Condition, RuleMatch, RuleSet, StringPattern};
pub use fetch::RuleFetcher;
pub use source::{compile_ruleset, compile_source};
