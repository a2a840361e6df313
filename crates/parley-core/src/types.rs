//! Shared domain types for the query understanding pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Intent name used when no configured keyword matched.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Well-known entity category names.
pub mod category {
    pub const NUMBERS: &str = "numbers";
    pub const EMAILS: &str = "emails";
    pub const DATES: &str = "dates";
    pub const PRODUCTS: &str = "products";
}

// =============================================================================
// EntitySet
// =============================================================================

/// Extracted entities grouped by category.
///
/// A category is only ever present with at least one value; inserting an
/// empty sequence is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySet(BTreeMap<String, Vec<String>>);

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of a category. Empty `values` leave the set untouched.
    pub fn insert(&mut self, category: impl Into<String>, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        self.0.insert(category.into(), values);
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.0.get(category).map(Vec::as_slice)
    }

    /// First value recorded for a category, if any.
    pub fn first(&self, category: &str) -> Option<&str> {
        self.0
            .get(category)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.0.contains_key(category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// =============================================================================
// IntentScore
// =============================================================================

/// Result of intent classification.
///
/// `confidence` is 0.0 exactly when `intent` is [`UNKNOWN_INTENT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    pub intent: String,
    pub confidence: f64,
}

impl IntentScore {
    pub fn unknown() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == UNKNOWN_INTENT
    }
}

// =============================================================================
// ConversationContext
// =============================================================================

/// Short-term memory of the most recently analyzed turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub last_intent: Option<String>,
    pub last_entities: Option<EntitySet>,
}

impl ConversationContext {
    pub fn is_empty(&self) -> bool {
        self.last_intent.is_none() && self.last_entities.is_none()
    }
}

/// Full analysis of a single utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub text: String,
    pub intent: String,
    pub confidence: f64,
    pub entities: EntitySet,
}

// =============================================================================
// Knowledge base
// =============================================================================

/// A curated question/answer pair with its matching keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub usage_count: u64,
}

// =============================================================================
// Responses
// =============================================================================

/// Which stage of the response chain produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMethod {
    Template,
    KnowledgeBase,
    Generative,
}

impl ResponseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMethod::Template => "template",
            ResponseMethod::KnowledgeBase => "knowledgebase",
            ResponseMethod::Generative => "generative",
        }
    }
}

impl fmt::Display for ResponseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry in a conversation's append-only response history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub intent: String,
    pub response_text: String,
    pub method: ResponseMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- EntitySet ----

    #[test]
    fn test_entity_set_drops_empty_categories() {
        let mut set = EntitySet::new();
        set.insert(category::NUMBERS, vec![]);
        assert!(set.is_empty());
        assert!(!set.contains(category::NUMBERS));
    }

    #[test]
    fn test_entity_set_first_value() {
        let mut set = EntitySet::new();
        set.insert(
            category::NUMBERS,
            vec!["12345".to_string(), "678".to_string()],
        );
        assert_eq!(set.first(category::NUMBERS), Some("12345"));
        assert_eq!(set.first(category::EMAILS), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_entity_set_serializes_as_plain_map() {
        let mut set = EntitySet::new();
        set.insert(category::EMAILS, vec!["a@b.io".to_string()]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"emails":["a@b.io"]}"#);
    }

    // ---- IntentScore ----

    #[test]
    fn test_unknown_score_has_zero_confidence() {
        let score = IntentScore::unknown();
        assert!(score.is_unknown());
        assert_eq!(score.confidence, 0.0);
    }

    // ---- ResponseMethod ----

    #[test]
    fn test_response_method_names() {
        assert_eq!(ResponseMethod::Template.to_string(), "template");
        assert_eq!(ResponseMethod::KnowledgeBase.to_string(), "knowledgebase");
        assert_eq!(ResponseMethod::Generative.to_string(), "generative");
        let json = serde_json::to_string(&ResponseMethod::KnowledgeBase).unwrap();
        assert_eq!(json, "\"knowledgebase\"");
    }

    #[test]
    fn test_context_default_is_empty() {
        let ctx = ConversationContext::default();
        assert!(ctx.is_empty());
    }
}
