//! Chat orchestrator: central coordinator for a turn.
//!
//! Owns the session map, runs analysis and response selection for each
//! utterance, and reports analytics. Mutable conversation state is always
//! looked up by session id; nothing conversational lives on the
//! orchestrator itself.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_core::types::{
    Analysis, ConversationContext, EntitySet, ResponseMethod, ResponseRecord,
};
use parley_llm::CompletionService;
use parley_nlu::QueryAnalyzer;
use parley_storage::{ConversationRepository, NewMessage};
use parley_voice::{AudioInput, SynthesisService, SynthesizedAudio, TranscriptionService};

use crate::analytics::AnalyticsTracker;
use crate::error::ChatError;
use crate::selector::ResponseSelector;
use crate::session::{Session, SessionManager, SessionState, SessionSummary};
use crate::sink::{MetricSink, NoopSink};
use crate::stage::{GenerativeStage, KnowledgeBaseStage, KnowledgeStore};
use crate::templates::TemplateCatalog;
use crate::timing::OperationTimer;

/// Intent that closes an interactive conversation.
pub const FAREWELL_INTENT: &str = "farewell";

/// Outcome of one processed utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub session_id: Uuid,
    pub user_text: String,
    pub intent: String,
    pub confidence: f64,
    pub entities: EntitySet,
    pub response_text: String,
    pub method: ResponseMethod,
    pub response_time_ms: u64,
}

impl TurnResult {
    /// True when the user said goodbye.
    pub fn ends_conversation(&self) -> bool {
        self.intent == FAREWELL_INTENT
    }
}

/// Outcome of a spoken turn.
///
/// The text turn is always valid. `audio` is absent when synthesis failed,
/// in which case `synthesis_error` says why.
#[derive(Debug, Clone)]
pub struct VoiceTurn {
    pub turn: TurnResult,
    pub audio: Option<SynthesizedAudio>,
    pub synthesis_error: Option<String>,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`ChatOrchestrator`] from configuration and collaborators.
pub struct OrchestratorBuilder {
    config: ParleyConfig,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    completion: Option<Arc<dyn CompletionService>>,
    sink: Arc<dyn MetricSink>,
    conversations: Option<ConversationRepository>,
}

impl OrchestratorBuilder {
    pub fn knowledge_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    pub fn completion_service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(service);
        self
    }

    pub fn metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Persist every turn's messages to the conversation log.
    pub fn conversation_log(mut self, repo: ConversationRepository) -> Self {
        self.conversations = Some(repo);
        self
    }

    /// Validate the configuration and wire the response chain.
    ///
    /// A stage is only added when its pipeline flag is on and its
    /// collaborator was supplied.
    pub fn build(self) -> Result<ChatOrchestrator, ChatError> {
        let config = self.config;
        config.validate()?;

        let analyzer = QueryAnalyzer::new(&config.intents)?;
        let templates = Arc::new(TemplateCatalog::from_config(&config)?);
        let analytics = Arc::new(AnalyticsTracker::new(self.sink));
        let mut selector = ResponseSelector::new(
            templates,
            Duration::from_millis(config.pipeline.stage_timeout_ms),
        )
        .with_sink(Arc::clone(&analytics) as Arc<dyn MetricSink>);

        if config.pipeline.knowledge_enabled {
            match self.knowledge {
                Some(store) => selector = selector.with_stage(Arc::new(KnowledgeBaseStage::new(store))),
                None => debug!("Knowledge stage enabled but no store supplied"),
            }
        }
        if config.pipeline.generative_enabled {
            match self.completion {
                Some(service) => {
                    selector = selector.with_stage(Arc::new(GenerativeStage::new(
                        service,
                        config.pipeline.max_message_length,
                    )))
                }
                None => warn!("Generative stage enabled but no completion service configured"),
            }
        }

        info!(stages = ?selector.methods(), "Chat orchestrator ready");

        Ok(ChatOrchestrator {
            analyzer,
            selector,
            session_manager: SessionManager::new(config.pipeline.session_timeout_minutes),
            sessions: Mutex::new(HashMap::new()),
            analytics,
            conversations: self.conversations,
            max_message_length: config.pipeline.max_message_length,
        })
    }
}

// =============================================================================
// ChatOrchestrator
// =============================================================================

/// Central coordinator that turns utterances into replies.
pub struct ChatOrchestrator {
    analyzer: QueryAnalyzer,
    selector: ResponseSelector,
    session_manager: SessionManager,
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
    analytics: Arc<AnalyticsTracker>,
    conversations: Option<ConversationRepository>,
    max_message_length: usize,
}

impl ChatOrchestrator {
    pub fn builder(config: ParleyConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            knowledge: None,
            completion: None,
            sink: Arc::new(NoopSink),
            conversations: None,
        }
    }

    /// Process one utterance.
    ///
    /// An unknown or expired `session_id` starts a new session; the id in the
    /// result is the one the caller should send next time.
    pub async fn process_text(
        &self,
        text: &str,
        session_id: Option<Uuid>,
    ) -> Result<TurnResult, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }

        let session = self.resolve_session(session_id)?;
        let mut state = session.state.lock().await;
        let start = Instant::now();

        let previous = state.context.get();
        let analysis = self.analyzer.analyze(text, &mut state.context);
        let (response_text, method) = self
            .selector
            .respond(&analysis.intent, &analysis.entities, &previous, Some(text))
            .await;

        state.responses.push(ResponseRecord {
            intent: analysis.intent.clone(),
            response_text: response_text.clone(),
            method,
        });
        session.touch();

        let elapsed = start.elapsed();
        self.analytics.track_query(
            text,
            &analysis.intent,
            analysis.confidence,
            elapsed.as_secs_f64(),
            true,
            None,
        );

        if let Err(e) = self
            .persist_turn(&mut state, session.id, &analysis, &response_text, method, elapsed)
            .await
        {
            warn!(session = %session.id, error = %e, "Failed to persist turn");
            self.analytics.track_error(
                "conversation_log",
                &e.to_string(),
                Some(&json!({ "session_id": session.id })),
            );
        }

        debug!(
            session = %session.id,
            intent = %analysis.intent,
            %method,
            elapsed_ms = elapsed.as_millis() as u64,
            "Turn processed"
        );

        Ok(TurnResult {
            session_id: session.id,
            user_text: analysis.text,
            intent: analysis.intent,
            confidence: analysis.confidence,
            entities: analysis.entities,
            response_text,
            method,
            response_time_ms: elapsed.as_millis() as u64,
        })
    }

    /// Transcribe audio, process the text, and synthesize the reply.
    ///
    /// A transcription failure ends the turn with [`ChatError::NoInput`]
    /// before any analysis. A synthesis failure still returns the text turn.
    pub async fn process_voice<T, S>(
        &self,
        session_id: Option<Uuid>,
        audio: &AudioInput,
        transcriber: &T,
        synthesizer: &S,
        output: Option<&Path>,
    ) -> Result<VoiceTurn, ChatError>
    where
        T: TranscriptionService,
        S: SynthesisService,
    {
        let timer = OperationTimer::start(self.metric_sink(), "transcription");
        let transcript = transcriber.transcribe(audio).await;
        timer.finish(matches!(&transcript, Ok(text) if !text.trim().is_empty()));

        let text = match transcript {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return Err(ChatError::NoInput("transcript is empty".to_string())),
            Err(e) => {
                self.analytics.track_error("transcription", &e.to_string(), None);
                return Err(ChatError::NoInput(e.to_string()));
            }
        };

        let turn = self.process_text(&text, session_id).await?;

        let timer = OperationTimer::start(self.metric_sink(), "synthesis");
        let synthesized = synthesizer.synthesize(&turn.response_text, output).await;
        timer.finish(synthesized.is_ok());

        match synthesized {
            Ok(audio) => Ok(VoiceTurn {
                turn,
                audio: Some(audio),
                synthesis_error: None,
            }),
            Err(e) => {
                warn!(session = %turn.session_id, error = %e, "Speech synthesis failed");
                self.analytics.track_error(
                    "synthesis",
                    &e.to_string(),
                    Some(&json!({ "session_id": turn.session_id })),
                );
                Ok(VoiceTurn {
                    turn,
                    audio: None,
                    synthesis_error: Some(e.to_string()),
                })
            }
        }
    }

    /// Snapshot of a session's context.
    pub async fn get_context(&self, session_id: Uuid) -> Result<ConversationContext, ChatError> {
        let session = self.get_session(session_id)?;
        let state = session.state.lock().await;
        Ok(state.context.get())
    }

    pub async fn clear_context(&self, session_id: Uuid) -> Result<(), ChatError> {
        let session = self.get_session(session_id)?;
        session.state.lock().await.context.clear();
        Ok(())
    }

    /// Replies produced in a session, oldest first.
    pub async fn history(&self, session_id: Uuid) -> Result<Vec<ResponseRecord>, ChatError> {
        let session = self.get_session(session_id)?;
        let state = session.state.lock().await;
        Ok(state.responses.clone())
    }

    pub async fn clear_history(&self, session_id: Uuid) -> Result<(), ChatError> {
        let session = self.get_session(session_id)?;
        session.state.lock().await.responses.clear();
        Ok(())
    }

    /// List all active sessions, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        let mut live: Vec<&Arc<Session>> = sessions.values().collect();
        live.sort_by_key(|s| (s.started_at, s.id));
        live.into_iter().map(|s| s.summary()).collect()
    }

    /// Delete a session by ID.
    pub fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::StorageError(format!("session lock poisoned: {}", e)))?;
        match sessions.remove(&session_id) {
            Some(_) => Ok(()),
            None => Err(ChatError::SessionNotFound(session_id)),
        }
    }

    pub fn analytics(&self) -> &AnalyticsTracker {
        &self.analytics
    }

    /// Wait for every metric and error recorded so far to reach the sink.
    pub async fn flush_metrics(&self) {
        self.analytics.flush().await;
    }

    pub fn selector(&self) -> &ResponseSelector {
        &self.selector
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    // -- Private helpers --

    fn metric_sink(&self) -> Arc<dyn MetricSink> {
        Arc::clone(&self.analytics) as Arc<dyn MetricSink>
    }

    fn get_session(&self, session_id: Uuid) -> Result<Arc<Session>, ChatError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::StorageError(format!("session lock poisoned: {}", e)))?;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    /// Reuse a live session or create a new one.
    fn resolve_session(&self, requested: Option<Uuid>) -> Result<Arc<Session>, ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::StorageError(format!("session lock poisoned: {}", e)))?;

        if let Some(sid) = requested {
            if let Some(session) = sessions.get(&sid) {
                if !self.session_manager.is_expired(session) {
                    return Ok(Arc::clone(session));
                }
                info!(session = %sid, "Session expired, starting a new one");
                sessions.remove(&sid);
            }
        }

        let session = Arc::new(self.session_manager.create_session());
        sessions.insert(session.id, Arc::clone(&session));
        Ok(session)
    }

    /// Append the turn to the conversation log on the blocking pool.
    async fn persist_turn(
        &self,
        state: &mut SessionState,
        session_id: Uuid,
        analysis: &Analysis,
        response_text: &str,
        method: ResponseMethod,
        elapsed: Duration,
    ) -> Result<(), ParleyError> {
        let Some(repo) = self.conversations.clone() else {
            return Ok(());
        };

        let known_conversation = state.conversation_id;
        let user_text = analysis.text.clone();
        let intent = analysis.intent.clone();
        let confidence = analysis.confidence;
        let entities = analysis.entities.clone();
        let response_text = response_text.to_string();

        let conversation_id = tokio::task::spawn_blocking(move || {
            let conversation_id = match known_conversation {
                Some(id) => id,
                None => repo.create_conversation(&session_id.to_string(), None)?,
            };
            repo.add_message(
                conversation_id,
                &NewMessage {
                    role: "user",
                    content: &user_text,
                    intent: Some(&intent),
                    confidence: Some(confidence),
                    entities: Some(&entities),
                    ..NewMessage::default()
                },
            )?;
            repo.add_message(
                conversation_id,
                &NewMessage {
                    role: "assistant",
                    content: &response_text,
                    intent: Some(&intent),
                    response_time: Some(elapsed.as_secs_f64()),
                    method: Some(method.as_str()),
                    ..NewMessage::default()
                },
            )?;
            Ok::<_, ParleyError>(conversation_id)
        })
        .await
        .map_err(|e| ParleyError::Storage(format!("conversation log task failed: {}", e)))??;

        state.conversation_id = Some(conversation_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
