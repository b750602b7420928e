//! Code Tutor session logs
//!
//! Append-only JSON Lines files, one per session, plus export and Markdown
//! transcript rendering for them.
//!
//! # Types
//!
//! - [`LogEntry`] - One logged event
//! - [`SessionLog`] - Writer for one session's log file
//! - [`export::ExportDocument`] - Every session merged into one document
//! - [`TranscriptRenderer`] - Markdown transcript of a session
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use serde_json::json;
//! use tutor_log::{LogEntry, SessionLog};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let started = Utc::now();
//! let mut log = SessionLog::create(dir.path(), "67e55044-10b1-426f-9247-bb680e5fe0c8", started).unwrap();
//!
//! log.append(&LogEntry::new(
//!     "67e55044-10b1-426f-9247-bb680e5fe0c8",
//!     started,
//!     "session_start",
//!     json!({"mode": "review"}),
//! ))
//! .unwrap();
//!
//! let entries = tutor_log::read_entries(log.path()).unwrap();
//! assert_eq!(entries.len(), 1);
//! ```

pub mod export;
mod transcript;

pub use transcript::TranscriptRenderer;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the directory, inside the config directory, that holds logs.
pub const LOG_DIR_NAME: &str = "logs";

const FILE_PREFIX: &str = "session_";
const FILE_EXTENSION: &str = "jsonl";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while writing or reading session logs.
#[derive(Debug, Error)]
pub enum LogError {
    /// Failed to serialize or deserialize an entry.
    #[error("failed to serialize log entry: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write log files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line in a log file is not a valid entry.
    #[error("invalid entry in '{path}' at line {line}: {message}")]
    InvalidEntry {
        /// The log file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },
}

/// A specialized `Result` type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

// ============================================================================
// LogEntry
// ============================================================================

/// One line of a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Session the entry belongs to.
    pub session_id: String,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event name, e.g. `turn_sent`.
    pub event: String,
    /// Event-specific data.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl LogEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp,
            event: event.into(),
            payload,
        }
    }

    /// Looks up a string field in the payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

// ============================================================================
// SessionLog
// ============================================================================

/// Append-only writer for one session's JSON Lines file.
///
/// Each entry is written as a single line and flushed immediately, so a
/// crash loses at most the entry being written.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: File,
    entries: usize,
}

impl SessionLog {
    /// Creates the log file for a session, creating `dir` if needed.
    ///
    /// The file is named `session_<YYYYmmdd_HHMMSS>_<first 8 chars of id>.jsonl`.
    /// An existing file with the same name is appended to.
    pub fn create(dir: &Path, session_id: &str, started_at: DateTime<Utc>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(session_file_name(session_id, started_at));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::debug!(path = %path.display(), "Session log opened");
        Ok(Self {
            path,
            file,
            entries: 0,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written through this writer.
    #[must_use]
    pub const fn entries_written(&self) -> usize {
        self.entries
    }

    /// Appends one entry.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.entries += 1;
        Ok(())
    }
}

/// Builds the file name for a session log.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
///
/// let started = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
/// let name = tutor_log::session_file_name("67e55044-10b1-426f", started);
/// assert_eq!(name, "session_20250115_103000_67e55044.jsonl");
/// ```
#[must_use]
pub fn session_file_name(session_id: &str, started_at: DateTime<Utc>) -> String {
    let short: String = session_id.chars().take(8).collect();
    format!(
        "{FILE_PREFIX}{}_{short}.{FILE_EXTENSION}",
        started_at.format("%Y%m%d_%H%M%S")
    )
}

/// Returns `true` if the path looks like a session log file.
#[must_use]
pub fn is_session_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(FILE_PREFIX)
        && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

/// Lists session log files in `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_sessions(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_session_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every entry of a session log. Blank lines are skipped.
pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| LogError::InvalidEntry {
            path: path.to_path_buf(),
            line: index + 1,
            message: e.to_string(),
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================
