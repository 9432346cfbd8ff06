//! Scan engines.
//!
//! Two engines share the rule matcher: [`DiskScanEngine`] walks a filesystem
//! subtree, [`ProcessMemoryScanEngine`] walks the live process table. Both
//! accumulate into a [`crate::core::types::ResultBatch`] and contain
//! per-item failures so one bad subject never aborts a scan.

pub mod disk;
pub mod filetype;
pub mod memory;
pub mod process;

pub use disk::DiskScanEngine;
pub use filetype::{FileClassification, FileTypeClassifier};
pub use memory::{ProcessMemoryScanEngine, ProcessScanOutcome};
pub use process::{ProcessEnumerator, ProcessInfo};
