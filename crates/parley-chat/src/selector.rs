//! The response chain: ordered stages ahead of a terminal template catalog.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use parley_core::types::{ConversationContext, EntitySet, ResponseMethod};

use crate::sink::{MetricSink, NoopSink};
use crate::stage::{ResponseStage, StageOutcome, StageRequest};
use crate::templates::TemplateCatalog;

/// Walks the configured stages in order and stops at the first answer.
///
/// A stage that fails or overruns its time budget is logged to the sink and
/// skipped. When no stage answers, the template catalog does, so
/// [`respond`](Self::respond) always produces text.
pub struct ResponseSelector {
    stages: Vec<Arc<dyn ResponseStage>>,
    templates: Arc<TemplateCatalog>,
    stage_timeout: Duration,
    sink: Arc<dyn MetricSink>,
}

impl ResponseSelector {
    pub fn new(templates: Arc<TemplateCatalog>, stage_timeout: Duration) -> Self {
        Self {
            stages: Vec::new(),
            templates,
            stage_timeout,
            sink: Arc::new(NoopSink),
        }
    }

    /// Append a stage. Stages run in the order they were added.
    pub fn with_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Methods of the configured stages, in evaluation order.
    pub fn methods(&self) -> Vec<ResponseMethod> {
        self.stages
            .iter()
            .map(|s| s.method())
            .chain(std::iter::once(ResponseMethod::Template))
            .collect()
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    /// Produce the reply for one turn and the method that produced it.
    pub async fn respond(
        &self,
        intent: &str,
        entities: &EntitySet,
        context: &ConversationContext,
        raw_query: Option<&str>,
    ) -> (String, ResponseMethod) {
        let request = StageRequest {
            intent,
            entities,
            context,
            raw_query,
        };

        for stage in &self.stages {
            let method = stage.method();
            let outcome =
                match tokio::time::timeout(self.stage_timeout, stage.try_respond(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => StageOutcome::Failed(format!(
                        "timed out after {} ms",
                        self.stage_timeout.as_millis()
                    )),
                };

            match outcome {
                StageOutcome::Answered(text) => {
                    debug!(%method, intent, "Stage answered");
                    return (text, method);
                }
                StageOutcome::Declined => {
                    debug!(%method, intent, "Stage declined");
                }
                StageOutcome::Failed(reason) => {
                    warn!(%method, intent, reason = %reason, "Stage failed, falling through");
                    self.sink.record_error(
                        &format!("{}_stage", method),
                        &reason,
                        Some(&json!({ "intent": intent, "query": raw_query })),
                    );
                }
            }
        }

        (
            self.templates.respond(intent, entities, context),
            ResponseMethod::Template,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::config::ParleyConfig;
    use parley_llm::ScriptedCompletionService;

    use crate::sink::MemorySink;
    use crate::stage::GenerativeStage;

    struct FixedStage(ResponseMethod, StageOutcome);

    #[async_trait]
    impl ResponseStage for FixedStage {
        fn method(&self) -> ResponseMethod {
            self.0
        }

        async fn try_respond(&self, _request: &StageRequest<'_>) -> StageOutcome {
            self.1.clone()
        }
    }

    fn catalog(seed: u64) -> Arc<TemplateCatalog> {
        let mut config = ParleyConfig::default();
        config.pipeline.rng_seed = Some(seed);
        Arc::new(TemplateCatalog::from_config(&config).unwrap())
    }

    fn selector(seed: u64) -> ResponseSelector {
        ResponseSelector::new(catalog(seed), Duration::from_millis(200))
    }

    // ---- Ordering ----

    #[tokio::test]
    async fn test_template_only_chain() {
        let sel = selector(1);
        let (text, method) = sel
            .respond("greeting", &EntitySet::new(), &ConversationContext::default(), Some("hi"))
            .await;
        assert_eq!(method, ResponseMethod::Template);
        assert!(ParleyConfig::default().templates["greeting"].contains(&text));
        assert_eq!(sel.methods(), vec![ResponseMethod::Template]);
    }

    #[tokio::test]
    async fn test_first_answer_wins() {
        let sel = selector(1)
            .with_stage(Arc::new(FixedStage(
                ResponseMethod::KnowledgeBase,
                StageOutcome::Answered("from faq".to_string()),
            )))
            .with_stage(Arc::new(FixedStage(
                ResponseMethod::Generative,
                StageOutcome::Answered("from model".to_string()),
            )));
        let (text, method) = sel
            .respond("unknown", &EntitySet::new(), &ConversationContext::default(), Some("q"))
            .await;
        assert_eq!(text, "from faq");
        assert_eq!(method, ResponseMethod::KnowledgeBase);
    }

    #[tokio::test]
    async fn test_declined_stage_falls_through() {
        let sel = selector(1)
            .with_stage(Arc::new(FixedStage(
                ResponseMethod::KnowledgeBase,
                StageOutcome::Declined,
            )))
            .with_stage(Arc::new(FixedStage(
                ResponseMethod::Generative,
                StageOutcome::Answered("from model".to_string()),
            )));
        let (_, method) = sel
            .respond("unknown", &EntitySet::new(), &ConversationContext::default(), Some("q"))
            .await;
        assert_eq!(method, ResponseMethod::Generative);
    }

    // ---- Failures ----

    #[tokio::test]
    async fn test_failed_stage_is_recorded_and_skipped() {
        let sink = Arc::new(MemorySink::new());
        let sel = selector(1)
            .with_sink(sink.clone())
            .with_stage(Arc::new(FixedStage(
                ResponseMethod::Generative,
                StageOutcome::Failed("boom".to_string()),
            )));
        let (_, method) = sel
            .respond("greeting", &EntitySet::new(), &ConversationContext::default(), Some("hi"))
            .await;
        assert_eq!(method, ResponseMethod::Template);

        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "generative_stage");
        assert_eq!(errors[0].message, "boom");
    }

    #[tokio::test]
    async fn test_failing_generative_matches_disabled_generative() {
        let with_failing = selector(5).with_stage(Arc::new(GenerativeStage::new(
            Arc::new(ScriptedCompletionService::failing("down")),
            2000,
        )));
        let without = selector(5);

        for query in ["hello there", "track my order 12345", "zzz"] {
            let a = with_failing
                .respond("order_status", &EntitySet::new(), &ConversationContext::default(), Some(query))
                .await;
            let b = without
                .respond("order_status", &EntitySet::new(), &ConversationContext::default(), Some(query))
                .await;
            assert_eq!(a, b);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_times_out() {
        let sink = Arc::new(MemorySink::new());
        let sel = ResponseSelector::new(catalog(1), Duration::from_millis(50))
            .with_sink(sink.clone())
            .with_stage(Arc::new(GenerativeStage::new(
                Arc::new(ScriptedCompletionService::delayed(
                    Duration::from_secs(10),
                    "too late",
                )),
                2000,
            )));
        let (text, method) = sel
            .respond("greeting", &EntitySet::new(), &ConversationContext::default(), Some("hi"))
            .await;
        assert_eq!(method, ResponseMethod::Template);
        assert_ne!(text, "too late");
        assert!(sink.errors()[0].message.contains("timed out"));
    }

    // ---- Knowledge timeout ----

    struct SlowStore {
        inner: parley_storage::KnowledgeRepository,
        delay: Duration,
    }

    impl crate::stage::KnowledgeStore for SlowStore {
        fn match_tokens(
            &self,
            tokens: &[String],
        ) -> Result<Option<parley_core::types::KnowledgeRecord>, parley_core::error::ParleyError> {
            std::thread::sleep(self.delay);
            self.inner.match_tokens(tokens)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_knowledge_match_is_still_counted() {
        let db = Arc::new(parley_storage::Database::in_memory().unwrap());
        let knowledge = parley_storage::KnowledgeRepository::new(Arc::clone(&db));
        knowledge.seed_defaults().unwrap();

        let sink = Arc::new(MemorySink::new());
        let sel = ResponseSelector::new(catalog(1), Duration::from_millis(20))
            .with_sink(sink.clone())
            .with_stage(Arc::new(crate::stage::KnowledgeBaseStage::new(Arc::new(SlowStore {
                inner: knowledge.clone(),
                delay: Duration::from_millis(300),
            }))));

        let (_, method) = sel
            .respond(
                "account",
                &EntitySet::new(),
                &ConversationContext::default(),
                Some("how do i reset my password"),
            )
            .await;
        assert_eq!(method, ResponseMethod::Template);
        assert_eq!(sink.errors()[0].kind, "knowledgebase_stage");

        let mut usage = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            usage = knowledge
                .list()
                .unwrap()
                .into_iter()
                .find(|r| r.category == "account")
                .map(|r| r.usage_count)
                .unwrap_or(0);
            if usage > 0 {
                break;
            }
        }
        assert_eq!(usage, 1);
    }
}
