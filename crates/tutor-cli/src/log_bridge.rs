//! Forwards engine events to session log files.
//!
//! Runs as a background task subscribed to the [`EventBroadcaster`], so a
//! slow disk never holds up a turn. Write failures are logged and dropped.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tutor_core::{EventBroadcaster, EventRecord, LoggingConfig};
use tutor_log::{LogEntry, SessionLog};

/// Converts an event record into a log entry.
pub fn to_log_entry(record: &EventRecord) -> serde_json::Result<LogEntry> {
    let value = serde_json::to_value(&record.event)?;
    let payload = value.get("payload").cloned().unwrap_or_default();
    Ok(LogEntry::new(
        record.session_id.to_string(),
        record.timestamp,
        record.event.event_name(),
        payload,
    ))
}

/// Starts the logging task. Returns `None` when logging is disabled.
///
/// The task ends once every sender of the broadcaster has been dropped.
pub fn spawn(
    broadcaster: &EventBroadcaster,
    logs_dir: PathBuf,
    logging: LoggingConfig,
) -> Option<JoinHandle<()>> {
    if !logging.enabled {
        return None;
    }

    let mut receiver = broadcaster.subscribe();
    Some(tokio::spawn(async move {
        let mut logs: HashMap<String, SessionLog> = HashMap::new();
        loop {
            match receiver.recv().await {
                Ok(record) => write_record(&mut logs, &logs_dir, &logging, &record),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Session log fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!(sessions = logs.len(), "Session logging stopped");
    }))
}

fn write_record(
    logs: &mut HashMap<String, SessionLog>,
    logs_dir: &std::path::Path,
    logging: &LoggingConfig,
    record: &EventRecord,
) {
    let Some(record) = record.redacted(logging) else {
        return;
    };

    let entry = match to_log_entry(&record) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(error = %e, "Could not serialize event");
            return;
        }
    };

    let log = match logs.entry(entry.session_id.clone()) {
        std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
        std::collections::hash_map::Entry::Vacant(slot) => {
            match SessionLog::create(logs_dir, &entry.session_id, entry.timestamp) {
                Ok(log) => slot.insert(log),
                Err(e) => {
                    tracing::warn!(error = %e, dir = %logs_dir.display(), "Could not open session log");
                    return;
                }
            }
        }
    };

    if let Err(e) = log.append(&entry) {
        tracing::warn!(error = %e, path = %log.path().display(), "Could not write session log");
    }
}
