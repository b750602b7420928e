//! Scripted model client for deterministic tests.
//!
//! Replies and failures are queued up front and handed out in order. Every
//! call's turn history is recorded so tests can check exactly what was sent.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ModelClient;
use crate::conversation::Turn;
use crate::error::{Result, TransportErrorKind, TutorError};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// The call succeeds with this text.
    Text(String),
    /// The call fails with a transport error of this kind.
    Failure(TransportErrorKind),
}

/// A [`ModelClient`] that replays a queue of canned outcomes.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Vec<Turn>>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that answers with each reply in turn.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    /// Delays every call, to exercise timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock_script().push_back(ScriptedReply::Text(text.into()));
    }

    /// Queues a transport failure.
    pub fn push_failure(&self, kind: TransportErrorKind) {
        self.lock_script().push_back(ScriptedReply::Failure(kind));
    }

    /// The turn history of every call so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of scripted outcomes not yet used.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock_script().len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedReply>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, turns: &[Turn], _model: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turns.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.lock_script().pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(kind)) => {
                Err(TutorError::transport(kind, "scripted failure"))
            }
            None => Err(TutorError::transport(
                TransportErrorKind::Other,
                "script exhausted",
            )),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order() {
        let client = ScriptedClient::with_replies(["first", "second"]);
        client.push_failure(TransportErrorKind::RateLimit);

        let turns = [Turn::user("hi")];
        assert_eq!(client.complete(&turns, "m").await.unwrap(), "first");
        assert_eq!(client.complete(&turns, "m").await.unwrap(), "second");

        let err = client.complete(&turns, "m").await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::RateLimit));
        assert_eq!(client.remaining(), 0);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails() {
        let client = ScriptedClient::new();
        let err = client.complete(&[Turn::user("hi")], "m").await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Other));
    }
}
