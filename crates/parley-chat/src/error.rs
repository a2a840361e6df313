//! Error types for the conversational pipeline.

use parley_core::error::ParleyError;

/// Errors surfaced to callers of the chat orchestrator.
///
/// Knowledge and generative stage failures never appear here; the response
/// selector absorbs them and falls through to the next stage.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("no input available: {0}")]
    NoInput(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::Config(msg) => ChatError::Configuration(msg),
            other => ChatError::StorageError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );
        assert_eq!(
            ChatError::NoInput("microphone muted".to_string()).to_string(),
            "no input available: microphone muted"
        );
        assert_eq!(
            ChatError::Configuration("missing unknown".to_string()).to_string(),
            "configuration error: missing unknown"
        );
        assert_eq!(
            ChatError::StorageError("disk full".to_string()).to_string(),
            "storage error: disk full"
        );
    }

    #[test]
    fn test_session_not_found_preserves_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            ChatError::SessionNotFound(id).to_string(),
            "session not found: 550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_config_error_maps_to_configuration() {
        let err: ChatError = ParleyError::Config("no intents".to_string()).into();
        assert!(matches!(err, ChatError::Configuration(ref m) if m == "no intents"));
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err: ChatError = ParleyError::Storage("connection lost".to_string()).into();
        assert!(matches!(err, ChatError::StorageError(_)));
        assert!(err.to_string().contains("connection lost"));
    }
}
