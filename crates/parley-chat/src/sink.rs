//! Fire-and-forget metric and error sinks.
//!
//! Sinks never return errors to the pipeline. A sink that cannot record
//! something logs a warning and moves on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use parley_core::error::ParleyError;
use parley_storage::MetricsRepository;

/// Destination for pipeline metrics and recovered errors.
#[async_trait]
pub trait MetricSink: Send + Sync {
    fn record_metric(&self, name: &str, value: f64, tags: Option<&Value>);
    fn record_error(&self, kind: &str, message: &str, context: Option<&Value>);

    /// Wait until everything recorded so far has reached its destination.
    async fn flush(&self) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricSink for NoopSink {
    fn record_metric(&self, _name: &str, _value: f64, _tags: Option<&Value>) {}
    fn record_error(&self, _kind: &str, _message: &str, _context: Option<&Value>) {}
}

/// Sink writing into the `analytics` and `error_logs` tables.
///
/// Inside a Tokio runtime each write runs on the blocking pool so SQLite
/// never stalls an async worker; [`MetricSink::flush`] waits for them.
/// Outside a runtime writes happen inline.
#[derive(Debug, Clone)]
pub struct StorageMetricSink {
    repo: MetricsRepository,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl StorageMetricSink {
    pub fn new(repo: MetricsRepository) -> Self {
        Self {
            repo,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn submit<F>(&self, label: String, write: F)
    where
        F: FnOnce(&MetricsRepository) -> Result<(), ParleyError> + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            if let Err(e) = write(&self.repo) {
                warn!(record = %label, error = %e, "Failed to record metric");
            }
            return;
        };

        let repo = self.repo.clone();
        let task = handle.spawn_blocking(move || {
            if let Err(e) = write(&repo) {
                warn!(record = %label, error = %e, "Failed to record metric");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }
}

#[async_trait]
impl MetricSink for StorageMetricSink {
    fn record_metric(&self, name: &str, value: f64, tags: Option<&Value>) {
        let owned_name = name.to_string();
        let tags = tags.cloned();
        self.submit(name.to_string(), move |repo| {
            repo.log_metric(&owned_name, value, tags.as_ref())
        });
    }

    fn record_error(&self, kind: &str, message: &str, context: Option<&Value>) {
        let owned_kind = kind.to_string();
        let message = message.to_string();
        let context = context.cloned();
        self.submit(kind.to_string(), move |repo| {
            repo.log_error(&owned_kind, &message, context.as_ref())
        });
    }

    async fn flush(&self) {
        let tasks = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Metric write task failed");
            }
        }
    }
}

/// A recorded metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Option<Value>,
}

/// A recorded error.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedError {
    pub kind: String,
    pub message: String,
    pub context: Option<Value>,
}

/// In-memory sink, handy for inspecting what a pipeline reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<RecordedMetric>>,
    errors: Mutex<Vec<RecordedError>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl MetricSink for MemorySink {
    fn record_metric(&self, name: &str, value: f64, tags: Option<&Value>) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.push(RecordedMetric {
                name: name.to_string(),
                value,
                tags: tags.cloned(),
            });
        }
    }

    fn record_error(&self, kind: &str, message: &str, context: Option<&Value>) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(RecordedError {
                kind: kind.to_string(),
                message: message.to_string(),
                context: context.cloned(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_storage::Database;
    use serde_json::json;

    #[test]
    fn test_storage_sink_writes_rows() {
        let repo = MetricsRepository::new(Arc::new(Database::in_memory().unwrap()));
        let sink = StorageMetricSink::new(repo.clone());

        sink.record_metric("query_count", 1.0, Some(&json!({"intent": "greeting"})));
        sink.record_error("generative_stage", "timed out", None);

        let metrics = repo.metrics(Some("query_count"), None).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metadata, Some(json!({"intent": "greeting"})));

        let errors = repo.error_logs(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, "generative_stage");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_storage_sink_writes_off_the_worker_until_flushed() {
        let repo = MetricsRepository::new(Arc::new(Database::in_memory().unwrap()));
        let sink = StorageMetricSink::new(repo.clone());

        for i in 0..10 {
            sink.record_metric("response_time", i as f64, None);
        }
        sink.record_error("synthesis", "no voice", None);
        sink.flush().await;

        assert_eq!(repo.metrics(Some("response_time"), None).unwrap().len(), 10);
        assert_eq!(repo.error_logs(10).unwrap().len(), 1);
        assert!(sink.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_on_idle_sink_returns() {
        StorageMetricSink::new(MetricsRepository::new(Arc::new(Database::in_memory().unwrap())))
            .flush()
            .await;
        NoopSink.flush().await;
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.record_metric("a", 1.0, None);
        sink.record_metric("b", 2.0, None);
        sink.record_error("kind", "msg", Some(&json!({"k": 1})));

        let names: Vec<String> = sink.metrics().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(sink.errors()[0].context, Some(json!({"k": 1})));
    }

    #[test]
    fn test_noop_sink_accepts_anything() {
        let sink = NoopSink;
        sink.record_metric("x", f64::NAN, None);
        sink.record_error("", "", None);
    }
}
