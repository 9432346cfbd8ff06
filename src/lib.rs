//! trailscan: endpoint-side IOC scanner
//!
//! This crate fetches one named detection rule from a central repository,
//! runs it against either the files under a directory or the memory of every
//! running process, and ships the accumulated matches back to the repository
//! in a single batched upload.

pub mod core;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::{Config, ScanContext};
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
