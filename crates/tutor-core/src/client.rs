//! The model client seam.
//!
//! Engines never talk HTTP themselves; they hand the full turn history to a
//! [`ModelClient`] and get text back. [`crate::anthropic::AnthropicClient`]
//! is the production implementation and [`crate::mock::ScriptedClient`]
//! replays canned replies in tests.

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::Result;

/// Executes one completion call.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends the ordered turn history and returns the assistant's text.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Transport` when the call fails for any reason.
    async fn complete(&self, turns: &[Turn], model: &str) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "model"
    }
}
