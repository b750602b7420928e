//! Exporting and clearing session logs.
//!
//! [`export_all`] merges every session file in a log directory into one
//! [`ExportDocument`], sessions ordered by file name (and so by start time).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{list_sessions, read_entries, LogEntry, Result};

/// One session in an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSession {
    /// Source file name.
    pub file: String,
    /// Session id, taken from the first entry.
    pub session_id: Option<String>,
    /// Entries in file order.
    pub entries: Vec<LogEntry>,
}

/// Every session log merged into one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// When the export was made.
    pub exported_at: DateTime<Utc>,
    /// Number of sessions.
    pub session_count: usize,
    /// Sessions ordered by file name.
    pub sessions: Vec<ExportedSession>,
}

impl ExportDocument {
    /// Total entries across all sessions.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.sessions.iter().map(|s| s.entries.len()).sum()
    }

    /// Serializes the document as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the document as pretty-printed JSON, creating parent directories.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), sessions = self.session_count, "Logs exported");
        Ok(())
    }
}

/// Reads one session log file.
pub fn export_session(path: &Path) -> Result<ExportedSession> {
    let entries = read_entries(path)?;
    Ok(ExportedSession {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        session_id: entries.first().map(|e| e.session_id.clone()),
        entries,
    })
}

/// Merges every session log in `dir`.
///
/// A missing directory gives an empty document.
pub fn export_all(dir: &Path) -> Result<ExportDocument> {
    let sessions = list_sessions(dir)?
        .iter()
        .map(|path| export_session(path))
        .collect::<Result<Vec<_>>>()?;

    Ok(ExportDocument {
        exported_at: Utc::now(),
        session_count: sessions.len(),
        sessions,
    })
}

/// Deletes every session log in `dir` and returns how many were removed.
pub fn clear_logs(dir: &Path) -> Result<usize> {
    let files = list_sessions(dir)?;
    for file in &files {
        std::fs::remove_file(file)?;
    }
    tracing::info!(dir = %dir.display(), removed = files.len(), "Session logs cleared");
    Ok(files.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SessionLog;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_session(dir: &Path, id: &str, hour: u32, events: &[&str]) {
        let started = Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap();
        let mut log = SessionLog::create(dir, id, started).unwrap();
        for event in events {
            log.append(&LogEntry::new(id, started, *event, json!({}))).unwrap();
        }
    }

    #[test]
    fn test_export_all_orders_sessions() {
        let temp = TempDir::new().unwrap();
        write_session(temp.path(), "bbbbbbbb-later", 12, &["session_start", "session_end"]);
        write_session(temp.path(), "aaaaaaaa-early", 9, &["session_start"]);

        let doc = export_all(temp.path()).unwrap();
        assert_eq!(doc.session_count, 2);
        assert_eq!(doc.entry_count(), 3);
        assert_eq!(doc.sessions[0].session_id.as_deref(), Some("aaaaaaaa-early"));
        assert_eq!(doc.sessions[1].entries.len(), 2);
    }

    #[test]
    fn test_export_empty_dir() {
        let temp = TempDir::new().unwrap();
        let doc = export_all(&temp.path().join("missing")).unwrap();
        assert_eq!(doc.session_count, 0);
        assert!(doc.sessions.is_empty());
    }

    #[test]
    fn test_write_to_file_round_trips() {
        let temp = TempDir::new().unwrap();
        write_session(temp.path(), "aaaaaaaa", 9, &["session_start"]);

        let out = temp.path().join("out").join("export.json");
        let doc = export_all(temp.path()).unwrap();
        doc.write_to_file(&out).unwrap();

        let parsed: ExportDocument =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_clear_logs_only_removes_sessions() {
        let temp = TempDir::new().unwrap();
        write_session(temp.path(), "aaaaaaaa", 9, &["session_start"]);
        write_session(temp.path(), "bbbbbbbb", 10, &["session_start"]);
        std::fs::write(temp.path().join("keep.txt"), "x").unwrap();

        assert_eq!(clear_logs(temp.path()).unwrap(), 2);
        assert!(temp.path().join("keep.txt").exists());
        assert_eq!(clear_logs(temp.path()).unwrap(), 0);
    }
}
