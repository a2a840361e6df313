//! Metric and error log persistence plus aggregate statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use parley_core::error::ParleyError;

use crate::db::{storage_err, Database};

/// Metric name recorded once per processed query.
pub const QUERY_COUNT_METRIC: &str = "query_count";
/// Metric name carrying per-query response time in seconds.
pub const RESPONSE_TIME_METRIC: &str = "response_time";

const SECONDS_PER_DAY: i64 = 86_400;

/// A stored metric sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub metric_name: String,
    pub metric_value: f64,
    pub metadata: Option<Value>,
    pub created_at: i64,
}

/// A stored error record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorLogRow {
    pub error_type: String,
    pub error_message: String,
    pub context: Option<Value>,
    pub created_at: i64,
}

/// Aggregates over a trailing window of stored metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseStatistics {
    pub period_days: u32,
    pub since: i64,
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
    pub queries_per_day: f64,
}

/// Repository for the `analytics` and `error_logs` tables.
#[derive(Debug, Clone)]
pub struct MetricsRepository {
    db: Arc<Database>,
}

impl MetricsRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn log_metric(
        &self,
        name: &str,
        value: f64,
        metadata: Option<&Value>,
    ) -> Result<(), ParleyError> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO analytics (metric_name, metric_value, metadata) VALUES (?1, ?2, ?3)",
                params![name, value, metadata_json],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to log metric: {}", e)))?;
            Ok(())
        })
    }

    /// Metric samples, newest first, optionally filtered by name and start time.
    pub fn metrics(
        &self,
        name: Option<&str>,
        since: Option<i64>,
    ) -> Result<Vec<MetricRow>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT metric_name, metric_value, metadata, created_at FROM analytics
                     WHERE (?1 IS NULL OR metric_name = ?1)
                       AND (?2 IS NULL OR created_at >= ?2)
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![name, since], |row| Ok(row_to_metric(row)))
                .map_err(storage_err)?;

            let mut metrics = Vec::new();
            for row in rows {
                metrics.push(row.map_err(storage_err)??);
            }
            Ok(metrics)
        })
    }

    pub fn log_error(
        &self,
        error_type: &str,
        message: &str,
        context: Option<&Value>,
    ) -> Result<(), ParleyError> {
        let context_json = context.map(serde_json::to_string).transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO error_logs (error_type, error_message, context) VALUES (?1, ?2, ?3)",
                params![error_type, message, context_json],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to log error: {}", e)))?;
            Ok(())
        })
    }

    /// Most recent error records, newest first.
    pub fn error_logs(&self, limit: u32) -> Result<Vec<ErrorLogRow>, ParleyError> {
        self.error_logs_since(None, limit)
    }

    fn error_logs_since(
        &self,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ErrorLogRow>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT error_type, error_message, context, created_at FROM error_logs
                     WHERE (?1 IS NULL OR created_at >= ?1)
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![since, limit], |row| Ok(row_to_error(row)))
                .map_err(storage_err)?;

            let mut errors = Vec::new();
            for row in rows {
                errors.push(row.map_err(storage_err)??);
            }
            Ok(errors)
        })
    }

    /// Aggregate the last `days` days of query metrics and errors.
    ///
    /// Query samples are the `query_count` rows; their metadata carries the
    /// `intent`, `confidence`, and `success` of each query.
    pub fn database_statistics(&self, days: u32) -> Result<DatabaseStatistics, ParleyError> {
        let since = Utc::now().timestamp() - i64::from(days) * SECONDS_PER_DAY;
        let queries = self.metrics(Some(QUERY_COUNT_METRIC), Some(since))?;
        let response_times = self.metrics(Some(RESPONSE_TIME_METRIC), Some(since))?;
        let errors = self.error_logs_since(Some(since), u32::MAX)?;

        let mut stats = DatabaseStatistics {
            period_days: days,
            since,
            total_queries: queries.len() as u64,
            ..DatabaseStatistics::default()
        };

        let mut confidences: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sample in &queries {
            let Some(metadata) = sample.metadata.as_ref() else {
                continue;
            };
            if metadata.get("success").and_then(Value::as_bool) == Some(true) {
                stats.successful_queries += 1;
            }
            let intent = metadata
                .get("intent")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let confidence = metadata
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            *stats.intent_distribution.entry(intent.clone()).or_default() += 1;
            confidences.entry(intent).or_default().push(confidence);
        }
        stats.failed_queries = stats.total_queries - stats.successful_queries;
        stats.average_confidence_by_intent = confidences
            .into_iter()
            .map(|(intent, values)| (intent, mean(&values)))
            .collect();

        if stats.total_queries > 0 {
            stats.success_rate =
                stats.successful_queries as f64 / stats.total_queries as f64 * 100.0;
        }
        let times: Vec<f64> = response_times.iter().map(|m| m.metric_value).collect();
        stats.average_response_time = mean(&times);

        stats.total_errors = errors.len() as u64;
        for error in &errors {
            *stats.error_types.entry(error.error_type.clone()).or_default() += 1;
        }

        if days > 0 {
            stats.queries_per_day = stats.total_queries as f64 / f64::from(days);
        }
        Ok(stats)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn parse_json_column(raw: Option<String>) -> Result<Option<Value>, ParleyError> {
    raw.map(|json| serde_json::from_str::<Value>(&json))
        .transpose()
        .map_err(ParleyError::from)
}

fn row_to_metric(row: &Row<'_>) -> Result<MetricRow, ParleyError> {
    Ok(MetricRow {
        metric_name: row.get(0).map_err(storage_err)?,
        metric_value: row.get(1).map_err(storage_err)?,
        metadata: parse_json_column(row.get(2).map_err(storage_err)?)?,
        created_at: row.get(3).map_err(storage_err)?,
    })
}

fn row_to_error(row: &Row<'_>) -> Result<ErrorLogRow, ParleyError> {
    Ok(ErrorLogRow {
        error_type: row.get(0).map_err(storage_err)?,
        error_message: row.get(1).map_err(storage_err)?,
        context: parse_json_column(row.get(2).map_err(storage_err)?)?,
        created_at: row.get(3).map_err(storage_err)?,
    })
}
