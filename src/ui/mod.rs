//! User interface.

pub mod cli;

pub use cli::{Cli, Commands};
