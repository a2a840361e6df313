//! Parley LLM crate - generative completion collaborator.
//!
//! Defines the `CompletionService` seam used by the response selector's
//! generative stage, an OpenAI-compatible HTTP client, and a scripted
//! implementation for tests and offline runs.

pub mod error;
pub mod mock;
pub mod openai;

use async_trait::async_trait;

pub use error::CompletionError;
pub use mock::ScriptedCompletionService;
pub use openai::OpenAiCompletionClient;

/// A service that turns a system prompt and a user prompt into text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a completion. The returned text is not yet trimmed.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}
