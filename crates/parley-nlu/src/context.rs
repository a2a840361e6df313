//! Per-conversation context tracking.

use parley_core::types::{ConversationContext, EntitySet};

/// Remembers the intent and entities of the most recent turn.
///
/// One tracker belongs to exactly one conversation. Callers that serve many
/// conversations keep one tracker per session id.
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    context: ConversationContext,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored context with the given turn. Nothing is merged.
    pub fn update(&mut self, intent: &str, entities: &EntitySet) {
        self.context = ConversationContext {
            last_intent: Some(intent.to_string()),
            last_entities: Some(entities.clone()),
        };
    }

    /// Snapshot of the current context.
    pub fn get(&self) -> ConversationContext {
        self.context.clone()
    }

    /// Reset to the empty initial state.
    pub fn clear(&mut self) {
        self.context = ConversationContext::default();
    }
}
