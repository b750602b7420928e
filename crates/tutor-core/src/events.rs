//! Session event records and broadcasting.
//!
//! Engines describe what happens in a session as [`SessionEvent`]s wrapped in
//! timestamped [`EventRecord`]s and hand them to an [`EventSink`]. Recording
//! is synchronous and never fails, so a broken logger cannot fail a turn.
//!
//! # Event Types
//!
//! - `session_start` - A review or teaching session begins
//! - `turn_sent` / `turn_received` - One exchange with the model
//! - `turn_failed` - The model call failed; the turn can be retried
//! - `user_input` - Answers, follow-ups or hints typed by the learner
//! - `analysis_parsed`, `feedback_parsed`, `exercise_parsed`, `evaluation_parsed`
//! - `round_complete` - A teaching round was decided
//! - `session_end` - The session closed
//!
//! # Example
//!
//! ```
//! use tutor_core::events::{EventBroadcaster, EventRecord, EventSink, SessionEvent};
//! use uuid::Uuid;
//!
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.record(EventRecord::new(Uuid::new_v4(), SessionEvent::error("boom")));
//!
//! let record = receiver.try_recv().unwrap();
//! assert_eq!(record.event.event_name(), "error");
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{LearnerProfile, LoggingConfig};
use crate::prompts::Difficulty;
use crate::state::SessionMode;

/// Which exchange of a session a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Initial code analysis.
    Analysis,
    /// Feedback on the learner's answers.
    Feedback,
    /// Open-ended follow-up in a review.
    FollowUp,
    /// Exercise generation.
    Exercise,
    /// Evaluation of the learner's hints.
    Evaluation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Feedback => write!(f, "feedback"),
            Self::FollowUp => write!(f, "follow_up"),
            Self::Exercise => write!(f, "exercise"),
            Self::Evaluation => write!(f, "evaluation"),
        }
    }
}

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `session_start` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartPayload {
    /// Review or teaching.
    pub mode: SessionMode,
    /// Model id.
    pub model: String,
    /// The learner's profile.
    pub profile: LearnerProfile,
    /// File under review, or the teaching topic.
    pub subject: String,
    /// Language of the code.
    pub language: String,
}

/// Payload for the `turn_sent` and `turn_received` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPayload {
    /// Stage the turn belongs to.
    pub stage: Stage,
    /// Length of the text in bytes.
    pub chars: usize,
    /// Full text; removed unless API call logging is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Payload for the `turn_failed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnFailedPayload {
    /// Stage the failed turn belongs to.
    pub stage: Stage,
    /// Error message.
    pub message: String,
    /// Whether the turn may be retried.
    pub retryable: bool,
}

/// Payload for the `user_input` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInputPayload {
    /// Stage the input was given for.
    pub stage: Stage,
    /// What the learner typed.
    pub text: String,
}

/// Payload for the `analysis_parsed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Parsed questions.
    pub questions: Vec<String>,
    /// Parsed observations.
    pub observations: Vec<String>,
    /// Bounds the reply fell outside of.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Payload for the `feedback_parsed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    /// Feedback or follow-up.
    pub stage: Stage,
    /// Number of recognised sections.
    pub sections: usize,
    /// Feedback text.
    pub feedback: String,
}

/// Payload for the `exercise_parsed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExercisePayload {
    /// Round number.
    pub round: u32,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Number of hidden issues the model recorded.
    pub hidden_issues: usize,
    /// The flawed code.
    pub code: String,
    /// The in-character question.
    pub student_question: String,
}

/// Payload for the `evaluation_parsed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPayload {
    /// Round number.
    pub round: u32,
    /// Whether the student reached understanding.
    pub understanding_achieved: bool,
    /// The in-character response.
    pub response: String,
}

/// Payload for the `round_complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundCompletePayload {
    /// Round number.
    pub round: u32,
    /// Whether understanding was achieved.
    pub achieved: bool,
    /// Whether the learner skipped the round.
    pub skipped: bool,
}

/// Payload for the `session_end` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndPayload {
    /// Review or teaching.
    pub mode: SessionMode,
    /// Total turns in the thread.
    pub turns: usize,
    /// How the session ended.
    pub outcome: String,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Something that happened in a session.
///
/// Serialized as a JSON object with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session began.
    SessionStart(SessionStartPayload),
    /// A user turn was sent to the model.
    TurnSent(TurnPayload),
    /// The model replied.
    TurnReceived(TurnPayload),
    /// The model call failed.
    TurnFailed(TurnFailedPayload),
    /// The learner typed something.
    UserInput(UserInputPayload),
    /// An analysis reply was parsed.
    AnalysisParsed(AnalysisPayload),
    /// A feedback or follow-up reply was parsed.
    FeedbackParsed(FeedbackPayload),
    /// An exercise reply was parsed.
    ExerciseParsed(ExercisePayload),
    /// An evaluation reply was parsed.
    EvaluationParsed(EvaluationPayload),
    /// A teaching round was decided.
    RoundComplete(RoundCompletePayload),
    /// The session closed.
    SessionEnd(SessionEndPayload),
    /// An error outside the turn cycle.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `TurnSent` event.
    #[must_use]
    pub fn turn_sent(stage: Stage, text: &str) -> Self {
        Self::TurnSent(TurnPayload {
            stage,
            chars: text.len(),
            text: Some(text.to_string()),
        })
    }

    /// Creates a `TurnReceived` event.
    #[must_use]
    pub fn turn_received(stage: Stage, text: &str) -> Self {
        Self::TurnReceived(TurnPayload {
            stage,
            chars: text.len(),
            text: Some(text.to_string()),
        })
    }

    /// Creates a `TurnFailed` event.
    #[must_use]
    pub fn turn_failed(stage: Stage, error: &crate::error::TutorError) -> Self {
        Self::TurnFailed(TurnFailedPayload {
            stage,
            message: error.to_string(),
            retryable: error.is_transport(),
        })
    }

    /// Creates a `UserInput` event.
    #[must_use]
    pub fn user_input(stage: Stage, text: impl Into<String>) -> Self {
        Self::UserInput(UserInputPayload {
            stage,
            text: text.into(),
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "session_start",
            Self::TurnSent(_) => "turn_sent",
            Self::TurnReceived(_) => "turn_received",
            Self::TurnFailed(_) => "turn_failed",
            Self::UserInput(_) => "user_input",
            Self::AnalysisParsed(_) => "analysis_parsed",
            Self::FeedbackParsed(_) => "feedback_parsed",
            Self::ExerciseParsed(_) => "exercise_parsed",
            Self::EvaluationParsed(_) => "evaluation_parsed",
            Self::RoundComplete(_) => "round_complete",
            Self::SessionEnd(_) => "session_end",
            Self::Error(_) => "error",
        }
    }

    /// Returns `true` for events that carry the content of the dialogue.
    #[must_use]
    pub const fn is_interaction(&self) -> bool {
        matches!(
            self,
            Self::UserInput(_)
                | Self::AnalysisParsed(_)
                | Self::FeedbackParsed(_)
                | Self::ExerciseParsed(_)
                | Self::EvaluationParsed(_)
        )
    }
}

/// A timestamped event belonging to one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Session the event belongs to.
    pub session_id: Uuid,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event: SessionEvent,
}

impl EventRecord {
    /// Wraps an event with the current time.
    #[must_use]
    pub fn new(session_id: Uuid, event: SessionEvent) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            event,
        }
    }

    /// Applies the logging settings to this record.
    ///
    /// Returns `None` if the record should not be logged at all. Turn text is
    /// removed unless `logApiCalls` is set; interaction events are dropped
    /// unless `logInteractions` is set.
    #[must_use]
    pub fn redacted(&self, logging: &LoggingConfig) -> Option<Self> {
        if !logging.enabled {
            return None;
        }
        if !logging.log_interactions && self.event.is_interaction() {
            return None;
        }

        let mut record = self.clone();
        if !logging.log_api_calls {
            if let SessionEvent::TurnSent(payload) | SessionEvent::TurnReceived(payload) =
                &mut record.event
            {
                payload.text = None;
            }
        }
        Some(record)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Receives event records from engines.
///
/// Implementations must not block and must swallow their own failures.
pub trait EventSink: Send + Sync {
    /// Records one event.
    fn record(&self, record: EventRecord);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _record: EventRecord) {}
}

/// Broadcasts event records to every subscriber.
///
/// Uses a tokio broadcast channel for pub-sub distribution. Records are not
/// kept for subscribers that join later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the given per-subscriber buffer.
    ///
    /// A subscriber that falls more than `capacity` records behind receives a
    /// `Lagged` error and misses the oldest records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Sends a record, returning the number of subscribers that will see it.
    pub fn send(&self, record: EventRecord) -> usize {
        // Err only means nobody is listening
        self.sender.send(record).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventBroadcaster {
    fn record(&self, record: EventRecord) {
        self.send(record);
    }
}

/// Stamps events with a session id and forwards them to a sink.
#[derive(Clone)]
pub(crate) struct Emitter {
    sink: Arc<dyn EventSink>,
    session_id: Uuid,
}

impl Emitter {
    pub(crate) fn new(sink: Arc<dyn EventSink>, session_id: Uuid) -> Self {
        Self { sink, session_id }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.sink.record(EventRecord::new(self.session_id, event));
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
