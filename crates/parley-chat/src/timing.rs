//! Operation timing reported as `{operation}_time` metrics.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::sink::MetricSink;

/// Measures one operation and reports it to a sink exactly once.
///
/// Call [`OperationTimer::finish`] with the outcome. A timer dropped without
/// finishing (early return, `?`, panic unwinding) is reported as a failure.
pub struct OperationTimer {
    sink: Arc<dyn MetricSink>,
    operation: String,
    started: Instant,
    reported: bool,
}

impl OperationTimer {
    pub fn start(sink: Arc<dyn MetricSink>, operation: impl Into<String>) -> Self {
        Self {
            sink,
            operation: operation.into(),
            started: Instant::now(),
            reported: false,
        }
    }

    pub fn metric_name(&self) -> String {
        format!("{}_time", self.operation)
    }

    /// Report the elapsed time and return it.
    pub fn finish(mut self, success: bool) -> Duration {
        self.report(success)
    }

    fn report(&mut self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.reported {
            self.reported = true;
            self.sink.record_metric(
                &self.metric_name(),
                elapsed.as_secs_f64(),
                Some(&json!({ "success": success })),
            );
        }
        elapsed
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.report(false);
    }
}

impl std::fmt::Debug for OperationTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTimer")
            .field("operation", &self.operation)
            .field("reported", &self.reported)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[tokio::test(start_paused = true)]
    async fn test_finish_reports_elapsed_time() {
        let sink = Arc::new(MemorySink::new());
        let timer = OperationTimer::start(sink.clone(), "transcription");
        tokio::time::sleep(Duration::from_millis(250)).await;
        let elapsed = timer.finish(true);

        assert_eq!(elapsed, Duration::from_millis(250));
        let metrics = sink.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "transcription_time");
        assert!((metrics[0].value - 0.25).abs() < 1e-9);
        assert_eq!(metrics[0].tags, Some(json!({ "success": true })));
    }

    #[tokio::test]
    async fn test_dropped_timer_reports_failure_once() {
        let sink = Arc::new(MemorySink::new());
        {
            let _timer = OperationTimer::start(sink.clone(), "synthesis");
        }
        let metrics = sink.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "synthesis_time");
        assert_eq!(metrics[0].tags, Some(json!({ "success": false })));
    }

    #[tokio::test]
    async fn test_finish_then_drop_does_not_double_report() {
        let sink = Arc::new(MemorySink::new());
        OperationTimer::start(sink.clone(), "export").finish(false);
        assert_eq!(sink.metrics().len(), 1);
    }
}
