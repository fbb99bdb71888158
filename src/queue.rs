//! # Change Queue — debounced per-project batching
//!
//! [`ChangeQueue`] is the entry point for file-change events on their way to
//! the [`crate::orchestrator::IngestionOrchestrator`]. It debounces bursts of
//! edits into batches the same way `watch.rs`'s `FileUpdateSyncer` debounces
//! filesystem notifications before reparsing, but expressed as a plain async
//! batcher rather than a `notify-debouncer-full` wrapper, since the queue
//! must also accept events pushed from non-filesystem sources (spec.md 4.D).
//!
//! ## Batching contract (spec.md 4.D)
//!
//! - Events carry `{path, change_type, project_id}`.
//! - The pending set is keyed by `path`; resubmission collapses, later
//!   `change_type` wins, `deleted` absorbs any prior entry for that path.
//! - A batch is emitted after `batch_interval` of silence *or* once the
//!   pending set reaches `max_batch_size`.
//! - While a batch is in flight for a project, further events accumulate in
//!   a queued batch; it's promoted to pending once the in-flight batch
//!   completes. Only one batch per project is ever in flight.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    /// `deleted` absorbs any prior change_type for the same path; otherwise
    /// the later event wins outright.
    fn merge(self, incoming: ChangeType) -> ChangeType {
        if self == ChangeType::Deleted || incoming == ChangeType::Deleted {
            ChangeType::Deleted
        } else {
            incoming
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: String,
    pub change_type: ChangeType,
    pub project_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub batch_interval: Duration,
    pub max_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            batch_interval: Duration::from_secs(1),
            max_batch_size: 100,
        }
    }
}

struct ProjectQueueState {
    pending: HashMap<String, ChangeType>,
    queued: HashMap<String, ChangeType>,
    in_flight: bool,
    first_pending_event_at: Option<Instant>,
}

impl ProjectQueueState {
    fn new() -> Self {
        ProjectQueueState {
            pending: HashMap::new(),
            queued: HashMap::new(),
            in_flight: false,
            first_pending_event_at: None,
        }
    }
}

/// Debounced, per-project batcher. One `ChangeQueue` instance is shared
/// across all projects; state for each project is kept independently so a
/// burst in one project never delays another's flush.
#[derive(Clone)]
pub struct ChangeQueue {
    config: QueueConfig,
    projects: Arc<Mutex<HashMap<String, ProjectQueueState>>>,
    notify: Arc<Notify>,
}

impl ChangeQueue {
    pub fn new(config: QueueConfig) -> Self {
        ChangeQueue {
            config,
            projects: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Submits an event. Collapses into the pending set (or the queued set,
    /// if a batch is currently in flight for this project) per the merge
    /// rule in [`ChangeType::merge`]. Wakes any waiter so a full pending set
    /// can be flushed immediately rather than waiting out the interval
    /// (spec.md 5 "Back-pressure").
    pub fn submit(&self, event: ChangeEvent) {
        let mut projects = self.projects.lock();
        let state = projects
            .entry(event.project_id.clone())
            .or_insert_with(ProjectQueueState::new);

        let target = if state.in_flight {
            &mut state.queued
        } else {
            &mut state.pending
        };

        let merged = match target.get(&event.path) {
            Some(existing) => existing.merge(event.change_type),
            None => event.change_type,
        };
        target.insert(event.path, merged);

        if !state.in_flight && state.first_pending_event_at.is_none() {
            state.first_pending_event_at = Some(Instant::now());
        }
        drop(projects);
        self.notify.notify_waiters();
    }

    /// Waits until a batch is ready for `project_id`: either
    /// `batch_interval` has elapsed since the first pending event, or the
    /// pending set reached `max_batch_size`. Returns `None` if no batch is
    /// ready and the caller should poll again (used by the orchestrator's
    /// per-project tick loop).
    pub async fn next_batch(&self, project_id: &str) -> Option<Vec<ChangeEvent>> {
        loop {
            let wait_for = {
                let mut projects = self.projects.lock();
                let Some(state) = projects.get_mut(project_id) else {
                    return None;
                };
                if state.in_flight || state.pending.is_empty() {
                    return None;
                }
                let started_at = state.first_pending_event_at.unwrap_or_else(Instant::now);
                let deadline = started_at + self.config.batch_interval;
                let ready_by_size = state.pending.len() >= self.config.max_batch_size;
                if ready_by_size || Instant::now() >= deadline {
                    state.in_flight = true;
                    let batch: Vec<ChangeEvent> = std::mem::take(&mut state.pending)
                        .into_iter()
                        .map(|(path, change_type)| ChangeEvent {
                            path,
                            change_type,
                            project_id: project_id.to_string(),
                        })
                        .collect();
                    state.first_pending_event_at = None;
                    return Some(batch);
                }
                deadline
            };
            tokio::select! {
                _ = tokio::time::sleep_until(wait_for) => {}
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Called by the orchestrator once a batch has fully completed.
    /// Promotes any events collected in the queued set to pending and
    /// clears the in-flight flag, preserving the single-in-flight-batch
    /// guarantee of spec.md 4.D.
    pub fn complete_batch(&self, project_id: &str) {
        let mut projects = self.projects.lock();
        if let Some(state) = projects.get_mut(project_id) {
            state.in_flight = false;
            if !state.queued.is_empty() {
                state.pending = std::mem::take(&mut state.queued);
                state.first_pending_event_at = Some(Instant::now());
            }
        }
        drop(projects);
        self.notify.notify_waiters();
    }

    pub fn pending_len(&self, project_id: &str) -> usize {
        self.projects
            .lock()
            .get(project_id)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }
}
