//! Error types for the Code Tutor core.
//!
//! This module defines the error hierarchy for every core operation:
//! configuration loading, source file reading, model transport failures and
//! misuse of the conversation engines.

use std::path::PathBuf;

/// A specialized `Result` type for Code Tutor core operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while running a tutoring session.
///
/// Variants are grouped by subsystem and carry actionable suggestions where
/// the user can do something about them.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in a configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your config.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// No API key could be found in the environment or the config file.
    #[error("API key not configured\n\nSuggestion: Run 'code-tutor setup' or set CODE_TUTOR_API_KEY / ANTHROPIC_API_KEY")]
    MissingApiKey,

    /// The API key is locked by the system configuration.
    #[error("API key is locked by the system configuration\n\nSuggestion: Ask your administrator to change the shared key")]
    ApiKeyLocked,

    // ========================================================================
    // Source File Errors
    // ========================================================================
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'\n\nSuggestion: Check the path and try again")]
    SourceNotFound {
        /// Path where the file was expected.
        path: PathBuf,
    },

    /// Path exists but is not a regular file.
    #[error("Not a file: '{path}'\n\nSuggestion: Pass a source file, or a directory to review every file in it")]
    SourceNotAFile {
        /// The offending path.
        path: PathBuf,
    },

    /// File extension is not a recognised source language.
    #[error("Unsupported file type '{extension}': '{path}'\n\nSuggestion: Run 'code-tutor info' to see supported languages")]
    UnsupportedSource {
        /// Path to the file.
        path: PathBuf,
        /// The unrecognised extension (may be empty).
        extension: String,
    },

    /// Source file exceeds the size limit.
    #[error("Source file exceeds size limit (100KB): '{path}' is {size_kb}KB\n\nSuggestion: Review a smaller file or split it into modules")]
    SourceTooLarge {
        /// Path to the oversized file.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    // ========================================================================
    // Model Transport Errors
    // ========================================================================
    /// The model call failed: network, rate limit, authentication, timeout.
    ///
    /// The turn that triggered it can be retried with unchanged state.
    #[error("Could not reach the model ({kind}): {message}\n\nSuggestion: {suggestion}")]
    Transport {
        /// The kind of transport failure.
        kind: TransportErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Engine Sequencing Errors
    // ========================================================================
    /// An engine method was called in a state that does not accept it.
    #[error("{engine} cannot {action} while {state}")]
    SequenceViolation {
        /// Which engine rejected the call.
        engine: String,
        /// The engine's current state.
        state: String,
        /// What the caller tried to do.
        action: String,
    },

    /// The session was closed and accepts no further turns.
    #[error("{engine} session is closed\n\nSuggestion: Start a new session")]
    SessionClosed {
        /// Which engine rejected the call.
        engine: String,
    },

    /// The number of answers does not match the number of questions.
    #[error("Expected {expected} answer(s), got {actual}")]
    AnswerCountMismatch {
        /// Number of questions asked.
        expected: usize,
        /// Number of answers supplied.
        actual: usize,
    },

    /// A turn was submitted with no content.
    #[error("Cannot send an empty {what}")]
    EmptyInput {
        /// What the caller tried to send.
        what: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of model transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The call did not finish within the configured timeout.
    Timeout,
    /// Other unclassified errors, including malformed API responses.
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl TransportErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key with 'code-tutor config'",
            Self::RateLimit => "Wait a moment and try again",
            Self::Server => "Try again later; the model service may be experiencing issues",
            Self::Network => "Check your network connection and try again",
            Self::Timeout => "Try again, or raise requestTimeoutSecs in your config",
            Self::Other => "Try again; if it keeps failing, check the model provider's status page",
        }
    }
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SourceNotFound` error.
    #[must_use]
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Creates a new `SourceNotAFile` error.
    #[must_use]
    pub fn source_not_a_file(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotAFile { path: path.into() }
    }

    /// Creates a new `UnsupportedSource` error.
    #[must_use]
    pub fn unsupported_source(path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            path: path.into(),
            extension: extension.into(),
        }
    }

    /// Creates a new `SourceTooLarge` error.
    #[must_use]
    pub fn source_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::SourceTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `Transport` error with the suggestion for its kind.
    #[must_use]
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `SequenceViolation` error.
    #[must_use]
    pub fn sequence_violation(
        engine: impl Into<String>,
        state: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        Self::SequenceViolation {
            engine: engine.into(),
            state: state.to_string(),
            action: action.into(),
        }
    }

    /// Creates a new `SessionClosed` error.
    #[must_use]
    pub fn session_closed(engine: impl Into<String>) -> Self {
        Self::SessionClosed {
            engine: engine.into(),
        }
    }

    /// Creates a new `EmptyInput` error.
    #[must_use]
    pub fn empty_input(what: impl Into<String>) -> Self {
        Self::EmptyInput { what: what.into() }
    }

    /// Returns the transport error kind, if this is a transport failure.
    #[must_use]
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if the model call failed and the turn can be retried.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if this error is transient and an immediate retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::RateLimit
                    | TransportErrorKind::Server
                    | TransportErrorKind::Network
                    | TransportErrorKind::Timeout,
                ..
            }
        )
    }

    /// Returns `true` if the caller used an engine out of sequence.
    ///
    /// These are programming or usage errors, never model problems.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::SequenceViolation { .. }
                | Self::SessionClosed { .. }
                | Self::AnswerCountMismatch { .. }
                | Self::EmptyInput { .. }
        )
    }

    /// Returns `true` if this error is fatal and the program should stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::MissingApiKey
                | Self::Transport {
                    kind: TransportErrorKind::Authentication,
                    ..
                }
        )
    }
}
