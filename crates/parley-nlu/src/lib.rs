//! Query understanding for Parley.
//!
//! Keyword-scored intent classification, regex entity extraction, and the
//! per-conversation context tracker that remembers the previous turn.

pub mod analyzer;
pub mod context;
pub mod entity;
pub mod intent;

pub use analyzer::QueryAnalyzer;
pub use context::ContextTracker;
pub use entity::EntityExtractor;
pub use intent::IntentClassifier;
