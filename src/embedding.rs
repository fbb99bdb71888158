//! Embedding Coordinator (component 4.H).
//!
//! Drives `linked -> embedding -> embedded`, calling an [`EmbeddingProvider`]
//! in bounded-concurrency batches and skipping any field the Metadata
//! Preserver already restored. Grounded on `other_examples`'s
//! `CachedEmbedder`/`EmbeddingStats` (cache-hit/miss accounting, one stats
//! struct shared across calls) for the stats shape, and on spec.md 5's
//! exponential-backoff retry wrapper (base delay 1s, multiplier x2, max 3
//! retries, applied to provider RPCs only).
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::error::IngestError;
use crate::model::EmbeddingField;

pub const DEFAULT_CONCURRENT_BATCHES: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 100;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_MULTIPLIER: u32 = 2;

/// One text awaiting a vector, tagged with the node/field it belongs to so
/// the coordinator can route the result back.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub uuid: Uuid,
    pub field: EmbeddingField,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub uuid: Uuid,
    pub field: EmbeddingField,
    pub vector: Vec<f32>,
    pub hash: String,
}

/// Implemented by a concrete embedding backend (local model, OpenAI, etc.).
/// The coordinator only ever calls `embed_batch`; everything else
/// (authentication, provider-specific rate limits) is the implementation's
/// concern, per spec.md 4.H's "Implementations must apply their own rate
/// limiting" note.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddingStats {
    pub restored: u64,
    pub generated: u64,
    pub retried: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    restored: AtomicU64,
    generated: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

/// Bounded-concurrency batch scheduler over an [`EmbeddingProvider`].
pub struct EmbeddingCoordinator<P: EmbeddingProvider> {
    provider: P,
    concurrent_batches: usize,
    batch_size: usize,
    counters: Counters,
}

impl<P: EmbeddingProvider> EmbeddingCoordinator<P> {
    pub fn new(provider: P) -> Self {
        EmbeddingCoordinator {
            provider,
            concurrent_batches: DEFAULT_CONCURRENT_BATCHES,
            batch_size: DEFAULT_BATCH_SIZE,
            counters: Counters::default(),
        }
    }

    pub fn with_limits(mut self, concurrent_batches: usize, batch_size: usize) -> Self {
        self.concurrent_batches = concurrent_batches;
        self.batch_size = batch_size;
        self
    }

    pub fn stats(&self) -> EmbeddingStats {
        EmbeddingStats {
            restored: self.counters.restored.load(Ordering::Relaxed),
            generated: self.counters.generated.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Embeds every pending request, chunked into `batch_size`-sized calls
    /// to the provider, up to `concurrent_batches` in flight at once.
    /// Requests already satisfied by a metadata restore should be filtered
    /// out by the caller before calling this (spec.md 4.H step 2) — this
    /// coordinator only ever generates fresh vectors.
    pub async fn embed_all(&self, requests: Vec<EmbeddingRequest>) -> Vec<(Uuid, EmbeddingField, Result<EmbeddingResult, IngestError>)> {
        let chunks: Vec<Vec<EmbeddingRequest>> = requests
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();

        let mut results = Vec::new();
        let mut iter = chunks.into_iter();
        let mut in_flight = Vec::new();

        loop {
            while in_flight.len() < self.concurrent_batches {
                match iter.next() {
                    Some(chunk) => in_flight.push(self.embed_chunk(chunk)),
                    None => break,
                }
            }
            if in_flight.is_empty() {
                break;
            }
            let chunk_results = in_flight.remove(0).await;
            results.extend(chunk_results);
        }
        results
    }

    async fn embed_chunk(
        &self,
        chunk: Vec<EmbeddingRequest>,
    ) -> Vec<(Uuid, EmbeddingField, Result<EmbeddingResult, IngestError>)> {
        let texts: Vec<String> = chunk.iter().map(|r| r.text.clone()).collect();
        match self.embed_with_backoff(&texts).await {
            Ok(vectors) => chunk
                .into_iter()
                .zip(vectors)
                .map(|(req, vector)| {
                    self.counters.generated.fetch_add(1, Ordering::Relaxed);
                    let hash = crate::identity::content_hash_hex(req.text.as_bytes());
                    (
                        req.uuid,
                        req.field,
                        Ok(EmbeddingResult {
                            uuid: req.uuid,
                            field: req.field,
                            vector,
                            hash,
                        }),
                    )
                })
                .collect(),
            Err(err) => {
                self.counters
                    .failed
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                chunk
                    .into_iter()
                    .map(|req| (req.uuid, req.field, Err(err.clone())))
                    .collect()
            }
        }
    }

    /// Exponential-backoff wrapper around the provider call: retries only on
    /// errors whose message signals a transient/rate-limit condition,
    /// per spec.md 5 (base delay 1s, x2 multiplier, 3 max retries).
    async fn embed_with_backoff(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if attempt < RETRY_MAX_ATTEMPTS && is_retryable(&err) => {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(attempt, ?delay, "[EmbeddingCoordinator] retrying after transient provider error");
                    tokio::time::sleep(delay).await;
                    delay *= RETRY_MULTIPLIER;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn record_restored(&self, count: u64) {
        self.counters.restored.fetch_add(count, Ordering::Relaxed);
    }
}

fn is_retryable(err: &IngestError) -> bool {
    match err {
        IngestError::EmbedError { message, .. } => {
            let lower = message.to_lowercase();
            lower.contains("429") || lower.contains("rate") || lower.contains("5xx") || lower.contains("timeout")
        }
        _ => false,
    }
}

/// Builds an `embedding_hashes` map from a set of results for a single node,
/// used when assembling the `SystemProperties` update the orchestrator
/// writes back.
pub fn group_by_node(
    results: Vec<(Uuid, EmbeddingField, Result<EmbeddingResult, IngestError>)>,
) -> HashMap<Uuid, Vec<(EmbeddingField, Result<EmbeddingResult, IngestError>)>> {
    let mut grouped: HashMap<Uuid, Vec<(EmbeddingField, Result<EmbeddingResult, IngestError>)>> = HashMap::new();
    for (uuid, field, result) in results {
        grouped.entry(uuid).or_default().push((field, result));
    }
    grouped
}
