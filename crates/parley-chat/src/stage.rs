//! Response stages ahead of the template fallback.
//!
//! Each stage reports an explicit [`StageOutcome`] instead of raising, so the
//! selector decides what happens next by inspecting values.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use parley_core::error::ParleyError;
use parley_core::types::{ConversationContext, EntitySet, KnowledgeRecord, ResponseMethod};
use parley_llm::CompletionService;
use parley_storage::KnowledgeRepository;

/// Instructions sent with every generative request.
pub const SYSTEM_PROMPT: &str = "You are a helpful customer service assistant for a voice bot system.
Your responses should be:
- Concise and clear (2-3 sentences maximum)
- Friendly and professional
- Action-oriented when appropriate
- Natural for speech synthesis

Do not use special characters or formatting that would sound awkward when spoken.";

/// Everything a stage may consult when answering one turn.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub intent: &'a str,
    pub entities: &'a EntitySet,
    /// Context as it stood before this turn was analyzed.
    pub context: &'a ConversationContext,
    pub raw_query: Option<&'a str>,
}

/// What a stage made of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage produced the reply.
    Answered(String),
    /// The stage had nothing to offer; not an error.
    Declined,
    /// The stage broke. The selector records the reason and moves on.
    Failed(String),
}

/// One link of the response chain.
#[async_trait]
pub trait ResponseStage: Send + Sync {
    fn method(&self) -> ResponseMethod;

    async fn try_respond(&self, request: &StageRequest<'_>) -> StageOutcome;
}

// =============================================================================
// Knowledge base
// =============================================================================

/// Read side of the FAQ store used by the knowledge stage.
pub trait KnowledgeStore: Send + Sync {
    /// Best record for lowercase `tokens`, with its usage already counted.
    fn match_tokens(&self, tokens: &[String]) -> Result<Option<KnowledgeRecord>, ParleyError>;
}

impl KnowledgeStore for KnowledgeRepository {
    fn match_tokens(&self, tokens: &[String]) -> Result<Option<KnowledgeRecord>, ParleyError> {
        KnowledgeRepository::match_tokens(self, tokens)
    }
}

/// Answers from the FAQ store when the query's tokens hit stored keywords.
///
/// The lookup runs on the blocking pool and cannot be cancelled. If the
/// selector's stage timeout fires first, the store still finishes the match
/// and counts the use even though the reply falls through to a later stage.
/// `usage_count` therefore counts matches made, not answers delivered.
pub struct KnowledgeBaseStage {
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeBaseStage {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

/// Whitespace tokens of `text`, lowercased.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

#[async_trait]
impl ResponseStage for KnowledgeBaseStage {
    fn method(&self) -> ResponseMethod {
        ResponseMethod::KnowledgeBase
    }

    async fn try_respond(&self, request: &StageRequest<'_>) -> StageOutcome {
        let Some(query) = request.raw_query else {
            return StageOutcome::Declined;
        };
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return StageOutcome::Declined;
        }

        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.match_tokens(&tokens)).await {
            Ok(Ok(Some(record))) => {
                debug!(faq_id = record.id, usage = record.usage_count, "Knowledge base matched");
                StageOutcome::Answered(record.answer)
            }
            Ok(Ok(None)) => StageOutcome::Declined,
            Ok(Err(e)) => StageOutcome::Failed(e.to_string()),
            Err(e) => StageOutcome::Failed(format!("knowledge lookup aborted: {}", e)),
        }
    }
}

// =============================================================================
// Generative
// =============================================================================

/// Asks a completion service for a reply.
pub struct GenerativeStage {
    service: Arc<dyn CompletionService>,
    max_query_chars: usize,
}

impl GenerativeStage {
    pub fn new(service: Arc<dyn CompletionService>, max_query_chars: usize) -> Self {
        Self {
            service,
            max_query_chars,
        }
    }
}

/// Build the user prompt for one turn.
///
/// The query is cut to `max_query_chars` characters. Entity and previous
/// intent lines are omitted when there is nothing to report.
pub fn build_user_prompt(
    query: &str,
    intent: &str,
    entities: &EntitySet,
    previous_intent: Option<&str>,
    max_query_chars: usize,
) -> String {
    let query: String = query.chars().take(max_query_chars).collect();
    let mut prompt = format!("User query: {}\nDetected intent: {}\n", query, intent);
    if !entities.is_empty() {
        let json = serde_json::to_string(entities).unwrap_or_default();
        prompt.push_str(&format!("Extracted entities: {}\n", json));
    }
    if let Some(previous) = previous_intent {
        prompt.push_str(&format!("Previous intent: {}\n", previous));
    }
    prompt.push_str("\nGenerate a helpful, natural-sounding response:");
    prompt
}

#[async_trait]
impl ResponseStage for GenerativeStage {
    fn method(&self) -> ResponseMethod {
        ResponseMethod::Generative
    }

    async fn try_respond(&self, request: &StageRequest<'_>) -> StageOutcome {
        let Some(query) = request.raw_query else {
            return StageOutcome::Declined;
        };
        let prompt = build_user_prompt(
            query,
            request.intent,
            request.entities,
            request.context.last_intent.as_deref(),
            self.max_query_chars,
        );

        match self.service.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    StageOutcome::Failed(format!("{} returned an empty completion", self.service.name()))
                } else {
                    StageOutcome::Answered(text.to_string())
                }
            }
            Err(e) => StageOutcome::Failed(e.to_string()),
        }
    }
}
