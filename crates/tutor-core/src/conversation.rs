//! Multi-turn conversation history.
//!
//! A [`ConversationThread`] is the ordered log of turns for one dialogue. It
//! owns the only primitive that touches the model: append a user turn, send
//! the whole history, append the reply.
//!
//! The log alternates user and assistant turns starting with a user turn. A
//! failed call leaves the user turn in place with no reply, so the next
//! [`ConversationThread::send`] resends it rather than stacking a second user
//! turn on top.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ModelClient;
use crate::error::{Result, TransportErrorKind, TutorError};

/// Who wrote a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The tutor application, speaking for the learner.
    User,
    /// The model.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Turn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only turn history bound to a model client.
pub struct ConversationThread {
    client: Arc<dyn ModelClient>,
    model: String,
    timeout: Duration,
    turns: Vec<Turn>,
    superseded: Vec<Turn>,
}

impl std::fmt::Debug for ConversationThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationThread")
            .field("client", &self.client.name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("turns", &self.turns.len())
            .field("superseded", &self.superseded.len())
            .finish()
    }
}

impl ConversationThread {
    /// Creates an empty thread.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
            turns: Vec::new(),
            superseded: Vec::new(),
        }
    }

    /// All turns in order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// User turns that were replaced before they got a reply, oldest first.
    #[must_use]
    pub fn superseded(&self) -> &[Turn] {
        &self.superseded
    }

    /// Number of turns in the thread.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` if nothing has been sent yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns `true` if the last turn is a user turn still waiting for a reply.
    #[must_use]
    pub fn has_pending_turn(&self) -> bool {
        self.turns.last().is_some_and(|turn| turn.role == Role::User)
    }

    /// The model id passed to the client.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `text` as a user turn and returns the assistant's reply.
    ///
    /// The reply is appended only when the call succeeds. If the previous
    /// call failed, sending the same text again retries it without adding a
    /// turn; sending different text replaces the unanswered turn, and the
    /// replaced text is kept in [`ConversationThread::superseded`].
    ///
    /// # Errors
    ///
    /// Returns `TutorError::EmptyInput` for blank text and
    /// `TutorError::Transport` when the client fails or the timeout elapses.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<String> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TutorError::empty_input("message"));
        }

        match self.turns.last() {
            Some(last) if last.role == Role::User && last.content == text => {
                tracing::debug!(turns = self.turns.len(), "Resending unanswered turn");
            }
            Some(last) if last.role == Role::User => {
                if let Some(replaced) = self.turns.pop() {
                    tracing::debug!(
                        replaced_len = replaced.content.len(),
                        "Replacing unanswered turn"
                    );
                    self.superseded.push(replaced);
                }
                self.turns.push(Turn::user(text));
            }
            _ => self.turns.push(Turn::user(text)),
        }

        tracing::debug!(
            client = self.client.name(),
            model = %self.model,
            turns = self.turns.len(),
            "Sending conversation"
        );

        let call = self.client.complete(&self.turns, &self.model);
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Model call failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "Model call timed out");
                return Err(TutorError::transport(
                    TransportErrorKind::Timeout,
                    format!("no reply within {}s", self.timeout.as_secs()),
                ));
            }
        };

        self.turns.push(Turn::assistant(reply.clone()));
        Ok(reply)
    }
}
