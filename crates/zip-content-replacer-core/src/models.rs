//! Core data models used throughout ZIP Content Replacer.
//!
//! These types describe the records being updated, the state of an import
//! run as it is persisted between continuation calls, and the log stream
//! returned to callers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record in the content store that an archive entry can replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    /// Record type (e.g. `"chapter"`, `"story"`).
    pub kind: String,
    pub title: String,
    pub slug: String,
    /// Id of the container record this record belongs to, if any.
    pub container_id: Option<i64>,
    pub body: String,
}

impl Record {
    /// True when this record may be matched inside `scope_id`.
    pub fn is_eligible(&self, scope_id: i64, record_kind: &str) -> bool {
        self.kind == record_kind && self.container_id == Some(scope_id)
    }
}

/// Fields needed to create a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub kind: String,
    pub title: String,
    pub slug: String,
    pub container_id: Option<i64>,
    pub body: String,
}

/// Result of writing a body into the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The body was replaced.
    Updated,
    /// The new body is identical to the stored one; nothing was written.
    Unchanged,
}

/// How archive filenames are matched against records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Exact title equality with the filename stem.
    Title,
    /// Slug equality with the slugified filename stem.
    Slug,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Title => "title",
            MatchMethod::Slug => "slug",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" | "by-title" | "by_title" => Ok(MatchMethod::Title),
            "slug" | "by-slug" | "by_slug" => Ok(MatchMethod::Slug),
            other => Err(format!(
                "unknown match method '{}': expected 'title' or 'slug'",
                other
            )),
        }
    }
}

/// Settings and position of one archive import, persisted per caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub archive_location: PathBuf,
    pub container_scope_id: i64,
    pub batch_size: usize,
    pub dry_run: bool,
    pub match_method: MatchMethod,
    pub backup_enabled: bool,
    pub show_preview: bool,
    /// Offset of the next entry to process.
    pub offset: usize,
    /// Number of entries in the archive.
    pub total: usize,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of an interrupted run, kept apart from the live descriptor so
/// the run can be reconstructed after the descriptor is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub offset: usize,
    pub total: usize,
    pub settings: RunDescriptor,
    pub saved_at: DateTime<Utc>,
}

/// A record's previous body, captured before an import overwrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub previous_body: String,
    pub captured_at: DateTime<Utc>,
    pub source_filename: String,
}

/// Severity of one line in the import log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Success,
    Error,
    Warning,
    Info,
    Skip,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Success => "success",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Skip => "skip",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(LogLevel::Success),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "skip" => Ok(LogLevel::Skip),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// One classified line of the per-batch log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Skip, message)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.as_str().to_uppercase(), self.message)
    }
}
