//! Structured spans for pipeline stages
//!
//! Every per-volume stage runs inside a [`StageSpan`] so that events from the
//! threshold, segmentation and ICP code carry the stage, volume and correlation id.

use std::path::Path;
use std::time::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

/// Span for one pipeline stage applied to one volume
pub struct StageSpan {
    span: Span,
    start_time: Instant,
    stage_name: String,
}

impl StageSpan {
    /// Create a new stage span; picks up the thread's correlation id when `None`
    pub fn new(stage_name: &str, volume: &Path, correlation_id: Option<Uuid>) -> Self {
        let correlation_id = correlation_id.or_else(crate::logging::get_correlation_id);
        let span = span!(
            Level::INFO,
            "pipeline_stage",
            stage = stage_name,
            volume = %volume.display(),
            correlation_id = field::Empty,
            points = field::Empty,
            success = field::Empty,
            execution_time_ms = field::Empty,
        );
        if let Some(id) = correlation_id {
            span.record("correlation_id", field::display(id));
        }

        Self {
            span,
            start_time: Instant::now(),
            stage_name: stage_name.to_string(),
        }
    }

    /// Record the size of an extracted or loaded point set
    pub fn record_points(&self, points: usize) {
        self.span.record("points", points);
        tracing::debug!(parent: &self.span, points, "Point set ready");
    }

    /// Record stage completion
    pub fn record_completion(&self, success: bool) {
        let duration = self.start_time.elapsed();
        self.span.record("success", success);
        self.span.record("execution_time_ms", duration.as_millis() as u64);

        tracing::info!(
            parent: &self.span,
            stage = %self.stage_name,
            success,
            execution_time_ms = duration.as_millis() as u64,
            "Pipeline stage completed"
        );
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_stage_span() {
        let span = StageSpan::new("sbi", Path::new("/data/vol_0"), Some(Uuid::new_v4()));
        let _enter = span.enter();
        span.record_points(12);
        span.record_completion(true);

        assert!(logs_contain("Pipeline stage completed"));
        assert!(logs_contain("points=12"));
        assert!(logs_contain("stage=sbi"));
    }
}
