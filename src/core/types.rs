//! Core type definitions used throughout trailscan.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanModule {
    /// Disk-based file scanning
    #[serde(rename = "disk-scan")]
    DiskScan,
    /// Live process-memory scanning
    #[serde(rename = "mem-scan")]
    MemScan,
}

impl ScanModule {
    /// Get string representation for the upload header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanModule::DiskScan => "disk-scan",
            ScanModule::MemScan => "mem-scan",
        }
    }
}

impl std::fmt::Display for ScanModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported hit of a rule against a subject.
///
/// The wire shape matches what the collector expects: file hits carry a
/// `filename`, process hits carry `processpath` and `processpid`. Process
/// records must come first in the untagged enum so deserialization does not
/// collapse them into the file variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchRecord {
    /// A rule hit inside a running process's memory.
    Process {
        rulename: String,
        processpath: String,
        processpid: u32,
        module: ScanModule,
        hostname: String,
    },
    /// A rule hit on a file (or an inner entry of a compound document,
    /// reported against the outer file's path).
    File {
        rulename: String,
        filename: PathBuf,
        module: ScanModule,
        hostname: String,
    },
}

impl MatchRecord {
    /// Create a disk-scan record for a file hit.
    pub fn file(rulename: impl Into<String>, path: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        Self::File {
            rulename: rulename.into(),
            filename: path.into(),
            module: ScanModule::DiskScan,
            hostname: hostname.into(),
        }
    }

    /// Create a mem-scan record for a process hit.
    pub fn process(
        rulename: impl Into<String>,
        path: impl Into<String>,
        pid: u32,
        hostname: impl Into<String>,
    ) -> Self {
        Self::Process {
            rulename: rulename.into(),
            processpath: path.into(),
            processpid: pid,
            module: ScanModule::MemScan,
            hostname: hostname.into(),
        }
    }

    /// The rule that produced this record.
    pub fn rule_name(&self) -> &str {
        match self {
            Self::File { rulename, .. } | Self::Process { rulename, .. } => rulename,
        }
    }

    /// The scanned subject: the outer file path or process executable path.
    pub fn subject(&self) -> String {
        match self {
            Self::File { filename, .. } => filename.display().to_string(),
            Self::Process { processpath, .. } => processpath.clone(),
        }
    }

    /// Which engine produced this record.
    pub fn module(&self) -> ScanModule {
        match self {
            Self::File { module, .. } | Self::Process { module, .. } => *module,
        }
    }

    /// The process id, for mem-scan records.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process { processpid, .. } => Some(*processpid),
            Self::File { .. } => None,
        }
    }
}

/// Match records accumulated over one full scan pass.
///
/// Finalized once the scan loop ends; posted at most once and never when
/// empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultBatch {
    records: Vec<MatchRecord>,
}

impl ResultBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: MatchRecord) {
        self.records.push(record);
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The accumulated records, in scan order.
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }
}
