//! Scripted completion service for tests and offline runs.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::CompletionService;

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(String),
    Delayed(Duration, String),
}

/// Completion service with a fixed behavior that records every prompt.
#[derive(Debug)]
pub struct ScriptedCompletionService {
    script: Script,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompletionService {
    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_script(Script::Reply(text.into()))
    }

    /// Always fail with a transport error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(message.into()))
    }

    /// Answer with `text` after sleeping for `delay`.
    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        Self::with_script(Script::Delayed(delay, text.into()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded (system prompt, user prompt) pairs, oldest first.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((system_prompt.to_string(), user_prompt.to_string()));
        }

        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail(message) => Err(CompletionError::Http(message.clone())),
            Script::Delayed(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replying_records_prompts() {
        let service = ScriptedCompletionService::replying("sure");
        let text = service.complete("system", "user").await.unwrap();
        assert_eq!(text, "sure");
        assert_eq!(
            service.calls(),
            vec![("system".to_string(), "user".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failing_returns_http_error() {
        let service = ScriptedCompletionService::failing("connection reset");
        let err = service.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, CompletionError::Http(ref m) if m == "connection reset"));
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_delayed_reply() {
        let service = ScriptedCompletionService::delayed(Duration::from_millis(5), "late");
        assert_eq!(service.complete("s", "u").await.unwrap(), "late");
    }
}
