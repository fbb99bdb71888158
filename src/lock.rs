//! Mutual-Exclusion Lock (component 4.I).
//!
//! Serializes ingestion against read traffic that must observe a consistent
//! snapshot. Grounded on `watch.rs`'s `PaginationCache` contention idiom
//! (`while <lock>.is_locked() { tracing::info!(...); sleep(...).await }`),
//! generalized into a named, reentrant-only-by-identical-holder-id lock
//! with a bounded wait instead of an unbounded busy loop.
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::IngestError;

#[derive(Debug, Clone)]
struct Held {
    holder_id: String,
    description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken {
    epoch: u64,
}

#[derive(Debug, Clone)]
pub struct LockStatus {
    pub is_locked: bool,
    pub operation_count: u64,
    pub description: Option<String>,
}

struct Inner {
    held: Option<Held>,
    epoch: u64,
    operation_count: u64,
}

/// A single named lock per project. Cloning shares the same underlying
/// state (cheap `Arc`-backed handle, matching the teacher's
/// `Arc<Mutex<...>>` sharing idiom).
#[derive(Clone)]
pub struct ProjectLock {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl Default for ProjectLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectLock {
    pub fn new() -> Self {
        ProjectLock {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                held: None,
                epoch: 0,
                operation_count: 0,
            })),
        }
    }

    /// Acquires the lock for `holder_id`. Reentrant only when the current
    /// holder re-acquires with the identical `holder_id`; any other holder
    /// must wait. Polls at a fixed interval, logging while contended, the
    /// same way `PaginationCache`'s callers do; gives up with
    /// `LockTimeout` once `timeout_ms` elapses.
    pub async fn acquire(
        &self,
        holder_id: &str,
        key: &str,
        description: Option<String>,
        timeout_ms: u64,
    ) -> Result<LockToken, IngestError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            {
                let mut inner = self.inner.lock();
                match &inner.held {
                    None => {
                        inner.epoch += 1;
                        inner.operation_count += 1;
                        let epoch = inner.epoch;
                        inner.held = Some(Held {
                            holder_id: holder_id.to_string(),
                            description,
                        });
                        return Ok(LockToken { epoch });
                    }
                    Some(held) if held.holder_id == holder_id => {
                        let epoch = inner.epoch;
                        return Ok(LockToken { epoch });
                    }
                    Some(_) => {} // held by someone else: fall through to wait
                }
            }
            if Instant::now() >= deadline {
                return Err(IngestError::LockTimeout {
                    key: key.to_string(),
                    timeout_ms,
                });
            }
            tracing::debug!("[ProjectLock] waiting to acquire lock for {key}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn release(&self, token: LockToken) {
        let mut inner = self.inner.lock();
        if inner.epoch == token.epoch {
            inner.held = None;
        }
    }

    /// Blocks (async) until the lock is free, without acquiring it. Used by
    /// best-effort query traffic that must not observe an intra-batch
    /// state but does not itself need to hold the lock.
    pub async fn wait_for_unlock(&self, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if !self.is_locked() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().held.is_some()
    }

    pub fn status(&self) -> LockStatus {
        let inner = self.inner.lock();
        LockStatus {
            is_locked: inner.held.is_some(),
            operation_count: inner.operation_count,
            description: inner.held.as_ref().and_then(|h| h.description.clone()),
        }
    }
}
