//! Metering decorator for job runnables.

use std::sync::Arc;
use std::time::Instant;

use jobward_jobs::{JobDefinition, JobExecutionError, JobRunnable};
use jobward_observability::MetricsSink;

/// Wraps a runnable and records its wall-clock runtime as a gauge
/// (`jobs.runtime.<type>`, seconds) after execution.
///
/// The inner outcome passes through untouched, success or failure.
pub struct MeteredRunnable<R> {
    inner: R,
    metrics: Arc<dyn MetricsSink>,
}

impl<R> MeteredRunnable<R>
where
    R: JobRunnable,
{
    pub fn new(inner: R, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { inner, metrics }
    }

    fn gauge_name(&self) -> String {
        format!(
            "jobs.runtime.{}",
            self.inner.definition().job_type().to_lowercase()
        )
    }
}

impl<R> JobRunnable for MeteredRunnable<R>
where
    R: JobRunnable,
{
    fn definition(&self) -> &JobDefinition {
        self.inner.definition()
    }

    fn execute(&self) -> Result<bool, JobExecutionError> {
        let started = Instant::now();
        let result = self.inner.execute();
        self.metrics
            .gauge(&self.gauge_name(), started.elapsed().as_secs_f64());
        result
    }
}
