// TracedEngine — tracing spans + metric recording around any `Engine`,
// following the `TracedStorage<S: Storage>` decorator pattern in
// `wrappers.rs`.

use crate::engine::{Engine, SearchRequest, SearchResult};
use crate::errors::Result;
use crate::metrics::SearchMetrics;
use crate::resource::{Resource, ResourceId, SpacePath};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct TracedEngine<E: Engine> {
    inner: E,
    metrics: Arc<SearchMetrics>,
    backend_label: &'static str,
}

impl<E: Engine> TracedEngine<E> {
    pub fn new(inner: E, metrics: Arc<SearchMetrics>, backend_label: &'static str) -> Self {
        Self {
            inner,
            metrics,
            backend_label,
        }
    }

    fn record(&self, op: &str, outcome: &str) {
        self.metrics.engine_ops_total(op, self.backend_label, outcome);
    }
}

#[async_trait]
impl<E: Engine> Engine for TracedEngine<E> {
    async fn search(&self, request: SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let query = request.query.clone();
        let result = self.inner.search(request).await;
        let elapsed = started.elapsed();
        self.metrics
            .search_duration_seconds(self.backend_label, elapsed.as_secs_f64());
        match &result {
            Ok(r) => {
                info!(query = %query, total = r.total_matches, elapsed_ms = elapsed.as_millis() as u64, "search completed");
                self.record("search", "ok");
            }
            Err(e) => {
                warn!(query = %query, error = %e, "search failed");
                self.record("search", "error");
            }
        }
        result
    }

    async fn upsert(&self, resource: &Resource) -> Result<()> {
        let result = self.inner.upsert(resource).await;
        self.record("upsert", if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn move_resource(
        &self,
        id: &ResourceId,
        new_parent_id: &ResourceId,
        new_path: &SpacePath,
    ) -> Result<()> {
        let result = self.inner.move_resource(id, new_parent_id, new_path).await;
        self.record("move", if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let result = self.inner.delete(id).await;
        self.record("delete", if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn restore(&self, id: &ResourceId) -> Result<()> {
        let result = self.inner.restore(id).await;
        self.record("restore", if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn purge(&self, id: &ResourceId) -> Result<()> {
        let result = self.inner.purge(id).await;
        self.record("purge", if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn doc_count(&self) -> Result<u64> {
        let result = self.inner.doc_count().await;
        self.record("doc_count", if result.is_ok() { "ok" } else { "error" });
        result
    }
}
