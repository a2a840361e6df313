//! Conversation and message log.

use std::sync::Arc;

use rusqlite::{params, Row};
use serde::Serialize;

use parley_core::error::ParleyError;
use parley_core::types::EntitySet;

use crate::db::{storage_err, Database};

/// A message to append to a conversation.
#[derive(Debug, Clone, Default)]
pub struct NewMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
    pub intent: Option<&'a str>,
    pub confidence: Option<f64>,
    pub entities: Option<&'a EntitySet>,
    pub response_time: Option<f64>,
    pub method: Option<&'a str>,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub entities: Option<EntitySet>,
    pub response_time: Option<f64>,
    pub method: Option<String>,
    pub created_at: i64,
}

/// Repository for conversations and their messages.
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start a conversation row for a session. Returns its id.
    pub fn create_conversation(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<i64, ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (session_id, user_id) VALUES (?1, ?2)",
                params![session_id, user_id],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to create conversation: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Append a message. Empty entity sets are stored as NULL.
    pub fn add_message(
        &self,
        conversation_id: i64,
        message: &NewMessage<'_>,
    ) -> Result<i64, ParleyError> {
        let entities_json = match message.entities {
            Some(entities) if !entities.is_empty() => Some(serde_json::to_string(entities)?),
            _ => None,
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, intent, confidence, entities, response_time, method)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversation_id,
                    message.role,
                    message.content,
                    message.intent,
                    message.confidence,
                    entities_json,
                    message.response_time,
                    message.method,
                ],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to add message: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All messages of a conversation in insertion order.
    pub fn history(&self, conversation_id: i64) -> Result<Vec<MessageRow>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, intent, confidence, entities, response_time, method, created_at
                     FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![conversation_id], |row| Ok(row_to_message(row)))
                .map_err(storage_err)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(storage_err)??);
            }
            Ok(messages)
        })
    }
}

fn row_to_message(row: &Row<'_>) -> Result<MessageRow, ParleyError> {
    let entities_json: Option<String> = row.get(6).map_err(storage_err)?;
    let entities = entities_json
        .map(|json| serde_json::from_str::<EntitySet>(&json))
        .transpose()?;
    Ok(MessageRow {
        id: row.get(0).map_err(storage_err)?,
        conversation_id: row.get(1).map_err(storage_err)?,
        role: row.get(2).map_err(storage_err)?,
        content: row.get(3).map_err(storage_err)?,
        intent: row.get(4).map_err(storage_err)?,
        confidence: row.get(5).map_err(storage_err)?,
        entities,
        response_time: row.get(7).map_err(storage_err)?,
        method: row.get(8).map_err(storage_err)?,
        created_at: row.get(9).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::category;

    fn repo() -> ConversationRepository {
        ConversationRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_create_conversation_ids_increase() {
        let repo = repo();
        let a = repo.create_conversation("session-a", None).unwrap();
        let b = repo.create_conversation("session-b", Some("user-1")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_add_and_read_history() {
        let repo = repo();
        let conv = repo.create_conversation("s1", None).unwrap();

        let mut entities = EntitySet::new();
        entities.insert(category::NUMBERS, vec!["12345".to_string()]);

        repo.add_message(
            conv,
            &NewMessage {
                role: "user",
                content: "where is order 12345",
                intent: Some("order_status"),
                confidence: Some(0.5),
                entities: Some(&entities),
                ..NewMessage::default()
            },
        )
        .unwrap();
        repo.add_message(
            conv,
            &NewMessage {
                role: "assistant",
                content: "Let me check.",
                intent: Some("order_status"),
                response_time: Some(0.01),
                method: Some("template"),
                ..NewMessage::default()
            },
        )
        .unwrap();

        let history = repo.history(conv).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[0].entities.as_ref(), Some(&entities));
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[1].entities, None);
        assert_eq!(history[1].method.as_deref(), Some("template"));
    }

    #[test]
    fn test_message_requires_existing_conversation() {
        let repo = repo();
        let result = repo.add_message(
            999,
            &NewMessage {
                role: "user",
                content: "orphan",
                ..NewMessage::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let repo = repo();
        let conv = repo.create_conversation("s1", None).unwrap();
        let result = repo.add_message(
            conv,
            &NewMessage {
                role: "system",
                content: "nope",
                ..NewMessage::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_history_of_unknown_conversation_is_empty() {
        assert!(repo().history(42).unwrap().is_empty());
    }
}
