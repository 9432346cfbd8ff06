//! Error types and result handling for trailscan.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for trailscan operations.
///
/// Fetch and compile errors are fatal to an invocation; everything scoped to
/// a single scanned item is recoverable and the scan loop continues past it.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Rule repository errors (fatal) =====
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rule not found on server: {0}")]
    RuleNotFound(String),

    #[error("Rule compilation failed: {0}")]
    RuleCompile(String),

    // ===== Per-item scan errors (recovered, scan continues) =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open compound document: {path}")]
    Container {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to scan item: {subject} - {reason}")]
    ItemAccess { subject: String, reason: String },

    #[error("Failed to read memory of process {pid}: {reason}")]
    ProcessMemory { pid: u32, reason: String },

    #[error("Failed to enumerate processes: {0}")]
    ProcessEnumeration(String),

    // ===== Reporting errors (recovered, logged, never retried) =====
    #[error("Result upload rejected with status {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("Result upload failed: {0}")]
    UploadFailed(String),

    // ===== Configuration errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    // ===== Serialization errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a compound document error.
    pub fn container(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Container {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a per-item access error.
    pub fn item_access(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ItemAccess {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create a process memory error.
    pub fn process_memory(pid: u32, reason: impl Into<String>) -> Self {
        Self::ProcessMemory {
            pid,
            reason: reason.into(),
        }
    }

    /// Check if this error is scoped to a single scanned item.
    ///
    /// Recoverable errors are logged and the scan loop moves on to the next
    /// file or process; everything else aborts the invocation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::Container { .. }
                | Error::ItemAccess { .. }
                | Error::ProcessMemory { .. }
        )
    }

    /// Check if this error is fatal to the whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RuleNotFound(_) | Error::RuleCompile(_)
        )
    }
}
