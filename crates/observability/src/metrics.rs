//! Metrics sink abstraction.
//!
//! The engine reports gauges (e.g. job runtime in seconds) through a sink
//! trait; the exporter behind it is wiring, not a concern of this workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Sink for named gauges.
///
/// Fire-and-forget: recording must never fail the caller.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, value: f64);
}

impl<S> MetricsSink for Arc<S>
where
    S: MetricsSink + ?Sized,
{
    fn gauge(&self, name: &str, value: f64) {
        (**self).gauge(name, value)
    }
}

/// Sink that drops every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn gauge(&self, _name: &str, _value: f64) {}
}

/// In-memory recorder for tests/dev: keeps the last value per gauge name.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    gauges: Mutex<HashMap<String, f64>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded value for a gauge, if any.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    pub fn gauge_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.gauges.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn gauge(&self, name: &str, value: f64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(name.to_string(), value);
        }
    }
}
