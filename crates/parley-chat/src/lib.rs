//! Conversational pipeline for Parley.
//!
//! Wires query analysis, the staged response selector, per-session context,
//! analytics, and the optional speech collaborators into a single
//! orchestrator that turns one utterance into one reply.

pub mod analytics;
pub mod error;
pub mod orchestrator;
pub mod selector;
pub mod session;
pub mod sink;
pub mod stage;
pub mod templates;
pub mod timing;

pub use analytics::{
    AnalyticsTracker, Dashboard, ErrorSummary, IntentPerformance, SessionStatistics,
};
pub use error::ChatError;
pub use orchestrator::{ChatOrchestrator, OrchestratorBuilder, TurnResult, VoiceTurn};
pub use selector::ResponseSelector;
pub use session::{Session, SessionManager, SessionSummary};
pub use sink::{MemorySink, MetricSink, NoopSink, StorageMetricSink};
pub use stage::{
    GenerativeStage, KnowledgeBaseStage, KnowledgeStore, ResponseStage, StageOutcome,
    StageRequest,
};
pub use templates::TemplateCatalog;
pub use timing::OperationTimer;
