//! Ambient ingestion metrics (SPEC_FULL.md 2): atomics-based counters, no
//! external metrics crate — the teacher carries none either, and spec.md's
//! Non-goals exclude a dashboard/exporter surface, so this stays a plain
//! in-process snapshot rather than wiring up `metrics`/`prometheus`.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSnapshot {
    pub files_discovered: u64,
    pub files_parsed: u64,
    pub files_errored: u64,
    pub batches_completed: u64,
    pub edges_resolved: u64,
    pub edges_pending: u64,
    pub embeddings_generated: u64,
    pub embeddings_restored: u64,
}

#[derive(Default)]
pub struct IngestionMetrics {
    files_discovered: AtomicU64,
    files_parsed: AtomicU64,
    files_errored: AtomicU64,
    batches_completed: AtomicU64,
    edges_resolved: AtomicU64,
    edges_pending: AtomicU64,
    embeddings_generated: AtomicU64,
    embeddings_restored: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_discovered(&self, n: u64) {
        self.files_discovered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_parsed(&self, n: u64) {
        self.files_parsed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_errored(&self, n: u64) {
        self.files_errored.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_batch_completed(&self) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_edges_resolved(&self, n: u64) {
        self.edges_resolved.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_edges_pending(&self, n: u64) {
        self.edges_pending.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_embeddings_generated(&self, n: u64) {
        self.embeddings_generated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_embeddings_restored(&self, n: u64) {
        self.embeddings_restored.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_parsed: self.files_parsed.load(Ordering::Relaxed),
            files_errored: self.files_errored.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            edges_resolved: self.edges_resolved.load(Ordering::Relaxed),
            edges_pending: self.edges_pending.load(Ordering::Relaxed),
            embeddings_generated: self.embeddings_generated.load(Ordering::Relaxed),
            embeddings_restored: self.embeddings_restored.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = IngestionMetrics::new();
        metrics.record_discovered(3);
        metrics.record_parsed(2);
        metrics.record_errored(1);
        metrics.record_batch_completed();
        let snap = metrics.snapshot();
        assert_eq!(snap.files_discovered, 3);
        assert_eq!(snap.files_parsed, 2);
        assert_eq!(snap.files_errored, 1);
        assert_eq!(snap.batches_completed, 1);
    }
}
