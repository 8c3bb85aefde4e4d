//! Error type for import, session, and backup operations.
//!
//! Per-entry problems never surface here; they become lines in the batch
//! log. An [`ImportError`] always aborts the whole call.

use thiserror::Error;

/// Run-level failures reported to the caller.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The archive is missing, corrupt, or not a ZIP container.
    #[error("cannot open the ZIP archive: {0}")]
    ArchiveUnreadable(String),

    /// No live run descriptor exists for the caller.
    #[error("session expired or file not found; please start over")]
    NoSession,

    /// The scope id does not resolve to a container of the expected kind.
    #[error("invalid container scope: {0}")]
    InvalidScope(String),

    /// The upload was rejected before any state was created.
    #[error("upload rejected: {0}")]
    UploadRejected(String),

    /// A request parameter is out of range or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller exceeded the request budget of the rolling window.
    #[error("too many requests; retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    /// Restore was requested for a record without a snapshot.
    #[error("no backup found for record {0}")]
    NoBackupFound(i64),

    /// A record identifier is not a positive integer.
    #[error("invalid record identifier: {0}")]
    InvalidIdentifier(String),

    /// A content or session store backend failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ImportError {
    /// Machine-readable error code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::ArchiveUnreadable(_) => "archive_unreadable",
            ImportError::NoSession => "no_session",
            ImportError::InvalidScope(_) => "bad_request",
            ImportError::UploadRejected(_) => "bad_request",
            ImportError::InvalidRequest(_) => "bad_request",
            ImportError::Throttled { .. } => "throttled",
            ImportError::NoBackupFound(_) => "not_found",
            ImportError::InvalidIdentifier(_) => "bad_request",
            ImportError::Store(_) => "internal",
        }
    }
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;
