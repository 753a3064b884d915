// Prometheus-backed metrics registry — §4.I / §10.N.
//
// Generalizes `observability.rs`'s `record_metric`/`MetricType` idiom into
// a real `prometheus` registry rather than ad-hoc atomics, since the spec
// requires fixed names/labels a registry expresses directly. Held by
// `Arc` and passed to every recording component rather than reached for
// as a process-global singleton, so tests can construct isolated
// registries.

use crate::errors::{Error, Result};
use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};

pub struct SearchMetrics {
    registry: Registry,
    events_dispatched_total: IntCounterVec,
    debounce_triggers_total: IntCounterVec,
    search_duration_seconds: HistogramVec,
    engine_ops_total: IntCounterVec,
    activitylog_writes_total: IntCounterVec,
    activitylog_evictions_total: IntCounterVec,
    migration_skipped_keys_total: IntCounterVec,
}

impl SearchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_dispatched_total = IntCounterVec::new(
            Opts::new(
                "searchcore_events_dispatched_total",
                "Events handed to the dispatcher",
            ),
            &["kind", "outcome"],
        )
        .map_err(registry_err)?;

        let debounce_triggers_total = IntCounterVec::new(
            Opts::new(
                "searchcore_debounce_triggers_total",
                "Debounce callback invocations per space",
            ),
            &["space"],
        )
        .map_err(registry_err)?;

        let search_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "searchcore_search_duration_seconds",
                "Search query latency",
            ),
            &["backend"],
        )
        .map_err(registry_err)?;

        let engine_ops_total = IntCounterVec::new(
            Opts::new("searchcore_engine_ops_total", "Engine operation outcomes"),
            &["op", "backend", "outcome"],
        )
        .map_err(registry_err)?;

        let activitylog_writes_total = IntCounterVec::new(
            Opts::new(
                "searchcore_activitylog_writes_total",
                "Activity log batch writes",
            ),
            &["outcome"],
        )
        .map_err(registry_err)?;

        let activitylog_evictions_total = IntCounterVec::new(
            Opts::new(
                "searchcore_activitylog_evictions_total",
                "Activity log cap-enforcement evictions",
            ),
            &["outcome"],
        )
        .map_err(registry_err)?;

        let migration_skipped_keys_total = IntCounterVec::new(
            Opts::new(
                "searchcore_migration_skipped_keys_total",
                "Legacy activity-log keys skipped during migration",
            ),
            &["reason"],
        )
        .map_err(registry_err)?;

        registry
            .register(Box::new(events_dispatched_total.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(debounce_triggers_total.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(search_duration_seconds.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(engine_ops_total.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(activitylog_writes_total.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(activitylog_evictions_total.clone()))
            .map_err(registry_err)?;
        registry
            .register(Box::new(migration_skipped_keys_total.clone()))
            .map_err(registry_err)?;

        Ok(Self {
            registry,
            events_dispatched_total,
            debounce_triggers_total,
            search_duration_seconds,
            engine_ops_total,
            activitylog_writes_total,
            activitylog_evictions_total,
            migration_skipped_keys_total,
        })
    }

    pub fn events_dispatched(&self, kind: &str, outcome: &str) {
        self.events_dispatched_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn debounce_trigger(&self, space: &str) {
        self.debounce_triggers_total.with_label_values(&[space]).inc();
    }

    pub fn search_duration_seconds(&self, backend: &str, seconds: f64) {
        self.search_duration_seconds
            .with_label_values(&[backend])
            .observe(seconds);
    }

    pub fn engine_ops_total(&self, op: &str, backend: &str, outcome: &str) {
        self.engine_ops_total
            .with_label_values(&[op, backend, outcome])
            .inc();
    }

    pub fn activitylog_write(&self, outcome: &str) {
        self.activitylog_writes_total.with_label_values(&[outcome]).inc();
    }

    pub fn activitylog_eviction(&self, outcome: &str) {
        self.activitylog_evictions_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn migration_skipped_key(&self, reason: &str) {
        self.migration_skipped_keys_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Transport(anyhow::anyhow!(e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Transport(e.into()))
    }
}

fn registry_err(e: prometheus::Error) -> Error {
    Error::Transport(anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metric_names() {
        let metrics = SearchMetrics::new().unwrap();
        metrics.events_dispatched("FileUploaded", "ok");
        metrics.engine_ops_total("search", "embedded", "ok");
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("searchcore_events_dispatched_total"));
        assert!(rendered.contains("searchcore_engine_ops_total"));
    }
}
