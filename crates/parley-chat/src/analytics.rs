//! In-process query and error statistics.
//!
//! Every tracked query and error is also forwarded to the configured
//! [`MetricSink`] so long-term aggregates survive the process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use parley_core::error::ParleyError;
use parley_storage::{DatabaseStatistics, QUERY_COUNT_METRIC, RESPONSE_TIME_METRIC};

use crate::sink::MetricSink;

/// Error kind recorded for queries that failed outright.
pub const QUERY_PROCESSING_ERROR: &str = "query_processing";

const MAX_ERROR_SAMPLES: usize = 3;

#[derive(Debug, Default)]
struct IntentTally {
    count: u64,
    successes: u64,
    response_time_total: f64,
    confidence_total: f64,
}

#[derive(Debug, Default)]
struct ErrorTally {
    count: u64,
    latest: i64,
    samples: Vec<String>,
}

#[derive(Debug)]
struct AnalyticsState {
    started_at: DateTime<Utc>,
    total_queries: u64,
    successful_queries: u64,
    response_time_total: f64,
    intents: BTreeMap<String, IntentTally>,
    errors: BTreeMap<String, ErrorTally>,
}

impl AnalyticsState {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_queries: 0,
            successful_queries: 0,
            response_time_total: 0.0,
            intents: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }
}

/// Snapshot of the statistics gathered since start or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatistics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    /// Percentage in [0, 100].
    pub success_rate: f64,
    /// Seconds.
    pub average_response_time: f64,
    pub intent_distribution: BTreeMap<String, u64>,
    pub average_confidence_by_intent: BTreeMap<String, f64>,
    pub total_errors: u64,
    pub error_types: BTreeMap<String, u64>,
    pub session_duration_secs: f64,
    pub queries_per_minute: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentPerformance {
    pub count: u64,
    pub average_response_time: f64,
    pub average_confidence: f64,
    /// Percentage in [0, 100].
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub count: u64,
    /// Unix seconds of the most recent occurrence.
    pub latest_occurrence: i64,
    pub sample_messages: Vec<String>,
}

/// Everything the tracker knows, plus optional long-term database figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub session_stats: SessionStatistics,
    pub intent_performance: BTreeMap<String, IntentPerformance>,
    pub error_summary: BTreeMap<String, ErrorSummary>,
    pub database_stats: Option<DatabaseStatistics>,
}

/// Collects per-process statistics and forwards samples to a sink.
pub struct AnalyticsTracker {
    sink: Arc<dyn MetricSink>,
    state: Mutex<AnalyticsState>,
}

impl AnalyticsTracker {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(AnalyticsState::new()),
        }
    }

    pub fn sink(&self) -> Arc<dyn MetricSink> {
        Arc::clone(&self.sink)
    }

    /// Record one processed query. `response_time` is in seconds.
    pub fn track_query(
        &self,
        query: &str,
        intent: &str,
        confidence: f64,
        response_time: f64,
        success: bool,
        error: Option<&str>,
    ) {
        {
            let mut state = self.lock();
            state.total_queries += 1;
            if success {
                state.successful_queries += 1;
            }
            state.response_time_total += response_time;

            let tally = state.intents.entry(intent.to_string()).or_default();
            tally.count += 1;
            tally.response_time_total += response_time;
            tally.confidence_total += confidence;
            if success {
                tally.successes += 1;
            }
        }

        self.sink.record_metric(
            QUERY_COUNT_METRIC,
            1.0,
            Some(&json!({
                "intent": intent,
                "confidence": confidence,
                "success": success,
            })),
        );
        self.sink.record_metric(
            RESPONSE_TIME_METRIC,
            response_time,
            Some(&json!({ "intent": intent })),
        );

        if !success {
            if let Some(message) = error {
                self.track_error(
                    QUERY_PROCESSING_ERROR,
                    message,
                    Some(&json!({ "query": query, "intent": intent })),
                );
            }
        }
    }

    /// Record an error by kind.
    pub fn track_error(&self, kind: &str, message: &str, context: Option<&Value>) {
        {
            let mut state = self.lock();
            let tally = state.errors.entry(kind.to_string()).or_default();
            tally.count += 1;
            tally.latest = Utc::now().timestamp();
            if tally.samples.len() < MAX_ERROR_SAMPLES {
                tally.samples.push(message.to_string());
            }
        }
        self.sink.record_error(kind, message, context);
    }

    pub fn session_statistics(&self) -> SessionStatistics {
        let state = self.lock();
        let failed = state.total_queries - state.successful_queries;
        let duration = (Utc::now() - state.started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let mut stats = SessionStatistics {
            total_queries: state.total_queries,
            successful_queries: state.successful_queries,
            failed_queries: failed,
            session_duration_secs: duration,
            ..SessionStatistics::default()
        };
        if state.total_queries > 0 {
            let total = state.total_queries as f64;
            stats.success_rate = state.successful_queries as f64 / total * 100.0;
            stats.average_response_time = state.response_time_total / total;
        }
        for (intent, tally) in &state.intents {
            stats.intent_distribution.insert(intent.clone(), tally.count);
            stats
                .average_confidence_by_intent
                .insert(intent.clone(), tally.confidence_total / tally.count as f64);
        }
        for (kind, tally) in &state.errors {
            stats.total_errors += tally.count;
            stats.error_types.insert(kind.clone(), tally.count);
        }
        if duration > 0.0 {
            stats.queries_per_minute = state.total_queries as f64 / (duration / 60.0);
        }
        stats
    }

    pub fn intent_performance(&self) -> BTreeMap<String, IntentPerformance> {
        let state = self.lock();
        state
            .intents
            .iter()
            .map(|(intent, tally)| {
                let count = tally.count as f64;
                (
                    intent.clone(),
                    IntentPerformance {
                        count: tally.count,
                        average_response_time: tally.response_time_total / count,
                        average_confidence: tally.confidence_total / count,
                        success_rate: tally.successes as f64 / count * 100.0,
                    },
                )
            })
            .collect()
    }

    pub fn error_summary(&self) -> BTreeMap<String, ErrorSummary> {
        let state = self.lock();
        state
            .errors
            .iter()
            .map(|(kind, tally)| {
                (
                    kind.clone(),
                    ErrorSummary {
                        count: tally.count,
                        latest_occurrence: tally.latest,
                        sample_messages: tally.samples.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn dashboard(&self, database_stats: Option<DatabaseStatistics>) -> Dashboard {
        Dashboard {
            session_stats: self.session_statistics(),
            intent_performance: self.intent_performance(),
            error_summary: self.error_summary(),
            database_stats,
        }
    }

    /// Write the dashboard as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn export(
        &self,
        path: &Path,
        database_stats: Option<DatabaseStatistics>,
    ) -> Result<(), ParleyError> {
        let json = serde_json::to_string_pretty(&self.dashboard(database_stats))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Metrics exported");
        Ok(())
    }

    /// Forget everything and restart the clock.
    pub fn reset(&self) {
        *self.lock() = AnalyticsState::new();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AnalyticsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lets the tracker stand in front of another sink: errors are tallied
/// locally and forwarded, metrics are forwarded untouched.
#[async_trait]
impl MetricSink for AnalyticsTracker {
    fn record_metric(&self, name: &str, value: f64, tags: Option<&Value>) {
        self.sink.record_metric(name, value, tags);
    }

    fn record_error(&self, kind: &str, message: &str, context: Option<&Value>) {
        self.track_error(kind, message, context);
    }

    async fn flush(&self) {
        self.sink.flush().await;
    }
}

impl std::fmt::Debug for AnalyticsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsTracker").finish_non_exhaustive()
    }
}
