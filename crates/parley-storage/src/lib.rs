//! Parley Storage crate - SQLite persistence for the assistant.
//!
//! Provides a WAL-mode SQLite database with migrations and repositories for
//! the FAQ knowledge base, the conversation log, metric/error records,
//! and customer profiles.

pub mod conversation;
pub mod db;
pub mod knowledge;
pub mod metrics;
pub mod migrations;
pub mod users;

pub use conversation::{ConversationRepository, MessageRow, NewMessage};
pub use db::Database;
pub use knowledge::KnowledgeRepository;
pub use metrics::{
    DatabaseStatistics, ErrorLogRow, MetricRow, MetricsRepository, QUERY_COUNT_METRIC,
    RESPONSE_TIME_METRIC,
};
pub use users::{ProfileUpdate, UserProfile, UserRepository};
