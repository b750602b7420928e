//! Session state types shared by the review and teaching engines.
//!
//! Each engine owns one [`SessionState`] and moves through its own state
//! enum. A state enum only ever moves forward along the edges documented on
//! it; every other request is rejected with a sequence error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ModelClient;
use crate::config::{Config, LearnerProfile};
use crate::conversation::ConversationThread;
use crate::error::Result;
use crate::events::{Emitter, SessionEvent, Stage};

// ============================================================================
// SessionMode
// ============================================================================

/// Which kind of session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// The learner's own code is reviewed.
    Review,
    /// The learner teaches a simulated student.
    Teaching,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Review => write!(f, "review"),
            Self::Teaching => write!(f, "teaching"),
        }
    }
}

// ============================================================================
// ReviewState
// ============================================================================

/// Where a review session is.
///
/// Transitions:
/// - `Idle` -> `Analyzing` -> `AwaitingAnswers` (a failed analysis returns to `Idle`)
/// - `AwaitingAnswers` -> `Feedback`
/// - `Feedback` / `FollowUp` -> `FollowUp`
/// - any state -> `Closed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// The analysis request is in flight.
    Analyzing,
    /// Questions were shown; waiting for the learner's answers.
    AwaitingAnswers,
    /// Feedback was delivered.
    Feedback,
    /// At least one follow-up was answered.
    FollowUp,
    /// The session is over.
    Closed,
}

impl ReviewState {
    /// Returns `true` once the session is closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_core::ReviewState;
    ///
    /// assert!(ReviewState::Closed.is_terminal());
    /// assert!(!ReviewState::FollowUp.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if follow-up questions are accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_core::ReviewState;
    ///
    /// assert!(ReviewState::Feedback.accepts_follow_up());
    /// assert!(ReviewState::FollowUp.accepts_follow_up());
    /// assert!(!ReviewState::AwaitingAnswers.accepts_follow_up());
    /// ```
    #[must_use]
    pub const fn accepts_follow_up(&self) -> bool {
        matches!(self, Self::Feedback | Self::FollowUp)
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::AwaitingAnswers => write!(f, "awaiting answers"),
            Self::Feedback => write!(f, "showing feedback"),
            Self::FollowUp => write!(f, "in follow-up"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ============================================================================
// TeachingState
// ============================================================================

/// Where a teaching session is.
///
/// Transitions:
/// - `Idle` -> `GeneratingExercise` -> `AwaitingHints`
/// - `AwaitingHints` -> `Evaluating` -> `RoundDecision`
/// - `RoundDecision` -> `GeneratingExercise` (next round) or `Closed`
/// - any state -> `Closed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingState {
    /// No exercise requested yet.
    #[default]
    Idle,
    /// The next exercise still has to be generated.
    GeneratingExercise,
    /// An exercise is shown; waiting for the learner's hints.
    AwaitingHints,
    /// The hints are being evaluated.
    Evaluating,
    /// The round's evaluation is in; deciding what comes next.
    RoundDecision,
    /// The session is over.
    Closed,
}

impl TeachingState {
    /// Returns `true` once the session is closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_core::TeachingState;
    ///
    /// assert!(TeachingState::Closed.is_terminal());
    /// assert!(!TeachingState::RoundDecision.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` while the engine waits on the learner.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        matches!(self, Self::AwaitingHints)
    }
}

impl std::fmt::Display for TeachingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::GeneratingExercise => write!(f, "generating an exercise"),
            Self::AwaitingHints => write!(f, "awaiting hints"),
            Self::Evaluating => write!(f, "evaluating hints"),
            Self::RoundDecision => write!(f, "deciding the round"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Settings an engine needs, taken from [`Config`] at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Learner profile used for every prompt.
    pub profile: LearnerProfile,
    /// Model id.
    pub model: String,
    /// Per-call timeout.
    pub request_timeout: Duration,
    /// Teaching round ceiling.
    pub max_rounds: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionOptions {
    /// Snapshots the relevant settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            profile: config.profile(),
            model: config.model.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_rounds: config.max_rounds,
        }
    }

    /// Overrides the teaching round ceiling. Values below 1 become 1.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// One session: its identity, its learner, and its conversation.
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    mode: SessionMode,
    started_at: DateTime<Utc>,
    round: u32,
    profile: LearnerProfile,
    thread: ConversationThread,
}

impl SessionState {
    /// Starts a session with a fresh id and an empty thread.
    #[must_use]
    pub fn new(mode: SessionMode, client: Arc<dyn ModelClient>, options: &SessionOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            started_at: Utc::now(),
            round: 0,
            profile: options.profile.clone(),
            thread: ConversationThread::new(client, options.model.clone(), options.request_timeout),
        }
    }

    /// Unique session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Review or teaching.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    /// When the session started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current teaching round; 0 before the first exercise and in reviews.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// The learner's profile.
    #[must_use]
    pub const fn profile(&self) -> &LearnerProfile {
        &self.profile
    }

    /// The conversation so far.
    #[must_use]
    pub const fn thread(&self) -> &ConversationThread {
        &self.thread
    }

    /// Time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    pub(crate) fn thread_mut(&mut self) -> &mut ConversationThread {
        &mut self.thread
    }

    /// Moves to the next round and returns it.
    pub(crate) fn advance_round(&mut self) -> u32 {
        self.round += 1;
        self.round
    }

    pub(crate) fn reset_round(&mut self) {
        self.round = 0;
    }

    /// Sends one prompt and reports the exchange to the event sink.
    pub(crate) async fn exchange(
        &mut self,
        events: &Emitter,
        stage: Stage,
        prompt: String,
    ) -> Result<String> {
        events.emit(SessionEvent::turn_sent(stage, &prompt));
        match self.thread.send(prompt).await {
            Ok(reply) => {
                events.emit(SessionEvent::turn_received(stage, &reply));
                Ok(reply)
            }
            Err(e) => {
                events.emit(SessionEvent::turn_failed(stage, &e));
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::ScriptedClient;

    #[test]
    fn test_review_state_default() {
        assert_eq!(ReviewState::default(), ReviewState::Idle);
        assert_eq!(TeachingState::default(), TeachingState::Idle);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ReviewState::AwaitingAnswers).unwrap(),
            "\"awaiting_answers\""
        );
        assert_eq!(
            serde_json::to_string(&TeachingState::GeneratingExercise).unwrap(),
            "\"generating_exercise\""
        );
        assert_eq!(serde_json::to_string(&SessionMode::Teaching).unwrap(), "\"teaching\"");

        let state: TeachingState = serde_json::from_str("\"round_decision\"").unwrap();
        assert_eq!(state, TeachingState::RoundDecision);
    }

    #[test]
    fn test_teaching_state_is_waiting() {
        assert!(TeachingState::AwaitingHints.is_waiting());
        assert!(!TeachingState::Evaluating.is_waiting());
        assert!(!TeachingState::Closed.is_waiting());
    }

    #[test]
    fn test_state_display_reads_in_errors() {
        assert_eq!(ReviewState::AwaitingAnswers.to_string(), "awaiting answers");
        assert_eq!(TeachingState::AwaitingHints.to_string(), "awaiting hints");
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            max_rounds: 3,
            request_timeout_secs: 30,
            ..Config::default()
        };
        let options = SessionOptions::from_config(&config);

        assert_eq!(options.max_rounds, 3);
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.model, config.model);
        assert_eq!(options.profile, config.profile());
    }

    #[test]
    fn test_options_max_rounds_floor() {
        let options = SessionOptions::default().with_max_rounds(0);
        assert_eq!(options.max_rounds, 1);
    }

    #[test]
    fn test_session_state_new() {
        let client: Arc<dyn ModelClient> = Arc::new(ScriptedClient::new());
        let mut state = SessionState::new(SessionMode::Teaching, client, &SessionOptions::default());

        assert_eq!(state.mode(), SessionMode::Teaching);
        assert_eq!(state.round(), 0);
        assert!(state.thread().is_empty());
        assert_eq!(state.id().get_version_num(), 4);

        assert_eq!(state.advance_round(), 1);
        assert_eq!(state.advance_round(), 2);
        state.reset_round();
        assert_eq!(state.round(), 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let client: Arc<dyn ModelClient> = Arc::new(ScriptedClient::new());
        let options = SessionOptions::default();
        let a = SessionState::new(SessionMode::Review, Arc::clone(&client), &options);
        let b = SessionState::new(SessionMode::Review, client, &options);
        assert_ne!(a.id(), b.id());
    }
}
