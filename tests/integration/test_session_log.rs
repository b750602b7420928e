//! Session logging end to end
//!
//! Engine events flow through an `EventBroadcaster` into JSON Lines files,
//! which are then exported, rendered as transcripts and cleared.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::Receiver;
use tutor_core::{
    Config, EventBroadcaster, EventRecord, ExperienceLevel, LoggingConfig, ModelClient,
    ScriptedClient, SessionOptions, TeachingEngine,
};
use tutor_log::export::{clear_logs, export_all};
use tutor_log::{list_sessions, read_entries, LogEntry, SessionLog, TranscriptRenderer};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn fixture_config() -> Config {
    Config::load_from_file(&fixture("config.json")).expect("Failed to load config fixture")
}

/// Drains `receiver` into a session log the way the CLI does.
fn write_session(
    receiver: &mut Receiver<EventRecord>,
    dir: &Path,
    logging: &LoggingConfig,
) -> PathBuf {
    let mut log: Option<SessionLog> = None;
    while let Ok(record) = receiver.try_recv() {
        let Some(record) = record.redacted(logging) else {
            continue;
        };
        let value = serde_json::to_value(&record.event).expect("event should serialize");
        let entry = LogEntry::new(
            record.session_id.to_string(),
            record.timestamp,
            record.event.event_name(),
            value.get("payload").cloned().unwrap_or_default(),
        );

        let writer = log.get_or_insert_with(|| {
            SessionLog::create(dir, &entry.session_id, entry.timestamp)
                .expect("Failed to create session log")
        });
        writer.append(&entry).expect("Failed to append entry");
    }
    log.expect("no events were recorded").path().to_path_buf()
}

async fn run_teaching_session(broadcaster: Arc<EventBroadcaster>, config: &Config) {
    let client = Arc::new(ScriptedClient::with_replies([
        "## Code\n```python\ndef count(n):\n    return count(n - 1)\n```\n\n\
         ## Student Question\nWhy does this never finish?\n\n\
         ## Hidden Issues\n- Missing base case",
        "## Student Response\nIt has to stop at zero!\n\n\
         ## Understanding Achieved\nYES",
    ]));
    let mut engine = TeachingEngine::new(
        client as Arc<dyn ModelClient>,
        broadcaster,
        &SessionOptions::from_config(config),
    );

    engine.start("recursion", "python").await.expect("start failed");
    engine
        .submit_hints("What should happen when n is 0?")
        .await
        .expect("evaluation failed");
}

/// Tests that the config fixture loads with its overrides and defaults.
#[test]
fn test_config_fixture_loads() {
    let config = fixture_config();

    assert_eq!(config.model, "haiku");
    assert_eq!(config.experience_level, ExperienceLevel::Beginner);
    assert_eq!(config.max_rounds, 3);
    assert!(config.logging.enabled);
    assert!(config.logging.log_interactions);
    assert!(!config.logging.log_api_calls);
    assert!(config.api_key.is_empty());

    let options = SessionOptions::from_config(&config);
    assert_eq!(options.max_rounds, 3);
}

/// Tests that a logged session can be read back, without raw prompt text.
#[tokio::test]
async fn test_session_written_and_redacted() {
    let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config = fixture_config();
    let broadcaster = Arc::new(EventBroadcaster::new(64));
    let mut receiver = broadcaster.subscribe();

    run_teaching_session(Arc::clone(&broadcaster), &config).await;
    let path = write_session(&mut receiver, temp.path(), &config.logging);

    let raw = std::fs::read_to_string(&path).expect("Failed to read log");
    assert!(!raw.contains("roleplaying"), "prompt text should be redacted");

    let entries = read_entries(&path).expect("Failed to parse log");
    assert_eq!(entries.first().map(|e| e.event.as_str()), Some("session_start"));
    assert_eq!(entries.last().map(|e| e.event.as_str()), Some("session_end"));
    assert!(entries
        .iter()
        .all(|e| e.session_id == entries[0].session_id));
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let hints = entries
        .iter()
        .find(|e| e.event == "user_input")
        .expect("hints should be logged");
    assert_eq!(hints.payload_str("text"), Some("What should happen when n is 0?"));

    let end = entries.last().expect("log is empty");
    assert_eq!(end.payload_str("outcome"), Some("understanding_achieved"));
}

/// Tests that full turn text is kept when API call logging is on.
#[tokio::test]
async fn test_api_calls_logged_when_enabled() {
    let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
    let mut config = fixture_config();
    config.logging.log_api_calls = true;
    let broadcaster = Arc::new(EventBroadcaster::new(64));
    let mut receiver = broadcaster.subscribe();

    run_teaching_session(Arc::clone(&broadcaster), &config).await;
    let path = write_session(&mut receiver, temp.path(), &config.logging);

    let entries = read_entries(&path).expect("Failed to parse log");
    let sent = entries
        .iter()
        .filter(|e| e.event == "turn_sent")
        .filter_map(|e| e.payload_str("text"))
        .collect::<Vec<_>>();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("Missing base case"));
}

/// Tests export, transcript rendering and clearing over two sessions.
#[tokio::test]
async fn test_export_transcript_and_clear() {
    let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config = fixture_config();

    for _ in 0..2 {
        let broadcaster = Arc::new(EventBroadcaster::new(64));
        let mut receiver = broadcaster.subscribe();
        run_teaching_session(Arc::clone(&broadcaster), &config).await;
        write_session(&mut receiver, temp.path(), &config.logging);
    }
    assert_eq!(list_sessions(temp.path()).expect("Failed to list").len(), 2);

    let document = export_all(temp.path()).expect("Failed to export");
    assert_eq!(document.session_count, 2);
    assert!(document.entry_count() > 10);
    assert_ne!(document.sessions[0].session_id, document.sessions[1].session_id);

    let output = temp.path().join("export").join("all.json");
    document.write_to_file(&output).expect("Failed to write export");
    let reparsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).expect("Failed to read export"))
            .expect("export should be valid JSON");
    assert_eq!(reparsed["session_count"], 2);

    let transcript = TranscriptRenderer::new(&document.sessions[0].entries).render();
    assert!(transcript.starts_with("# Code Tutor Teaching: recursion"));
    assert!(transcript.contains("Why does this never finish?"));
    assert!(transcript.contains("What should happen when n is 0?"));
    assert!(transcript.contains("It has to stop at zero!"));
    assert!(!transcript.contains("Missing base case"));

    assert_eq!(clear_logs(temp.path()).expect("Failed to clear"), 2);
    assert!(list_sessions(temp.path()).expect("Failed to list").is_empty());
    assert!(output.exists(), "clearing must leave other files alone");
}
