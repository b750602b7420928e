//! Code Tutor core
//!
//! Conversation engines for the two tutoring modes, the prompts they send,
//! the parser that reads the replies, and the model client they talk to.

pub mod anthropic;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod mock;
pub mod parser;
pub mod prompts;
pub mod review;
pub mod source;
pub mod state;
pub mod teaching;

pub use anthropic::AnthropicClient;
pub use client::ModelClient;
pub use config::{
    Config, ExperienceLevel, FocusArea, LearnerProfile, LoggingConfig, Preferences, QuestionStyle,
    AVAILABLE_MODELS,
};
pub use conversation::{ConversationThread, Role, Turn};
pub use error::{Result, TransportErrorKind, TutorError};
pub use events::{EventBroadcaster, EventRecord, EventSink, NullSink, SessionEvent, Stage};
pub use mock::ScriptedClient;
pub use parser::{
    AnalysisBounds, AnalysisResult, EvaluationResult, ExerciseSpec, ExerciseView, FeedbackHeading,
    FeedbackResult,
};
pub use prompts::{Difficulty, PromptBuilder};
pub use review::{ReviewEngine, ReviewOpening, ReviewSummary};
pub use source::{find_sources, CodeUnit, MAX_SOURCE_SIZE};
pub use state::{ReviewState, SessionMode, SessionOptions, SessionState, TeachingState};
pub use teaching::{NextStep, RoundRecord, RoundResult, TeachingEngine, TeachingOutcome, TeachingSummary};
