//! File State Store (component 4.C).
//!
//! In-memory index guarded the way `schema_registry.rs`'s `SchemaRegistry`
//! guards its map: a `parking_lot::RwLock` with a busy-wait-and-log loop
//! while the lock is contended, rather than blocking silently. Optional
//! sqlite persistence under the `service` feature mirrors `db.rs`'s
//! `Transaction`/`track_file_mtime` capture-before-mutate style.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::IngestError;
use crate::model::ErrorKind as ModelErrorKind;
use crate::state_machine::{validate_transition, NodeState};

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub uuid: Uuid,
    pub project_id: String,
    pub path: String,
    pub state: NodeState,
    pub state_updated_at: i64,
    pub content_hash: Option<String>,
    pub error_type: Option<ModelErrorKind>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl FileRecord {
    pub fn new(uuid: Uuid, project_id: impl Into<String>, path: impl Into<String>, now: i64) -> Self {
        FileRecord {
            uuid,
            project_id: project_id.into(),
            path: path.into(),
            state: NodeState::Discovered,
            state_updated_at: now,
            content_hash: None,
            error_type: None,
            error_message: None,
            retry_count: 0,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TransitionOpts {
    pub error_type: Option<ModelErrorKind>,
    pub error_message: Option<String>,
    pub content_hash: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectStats {
    pub mentioned: u64,
    pub discovered: u64,
    pub parsing: u64,
    pub parsed: u64,
    pub relations: u64,
    pub linked: u64,
    pub embedding: u64,
    pub embedded: u64,
    pub error: u64,
}

impl ProjectStats {
    pub fn total(&self) -> u64 {
        self.mentioned
            + self.discovered
            + self.parsing
            + self.parsed
            + self.relations
            + self.linked
            + self.embedding
            + self.embedded
            + self.error
    }

    pub fn count(&self, state: NodeState) -> u64 {
        match state {
            NodeState::Mentioned => self.mentioned,
            NodeState::Discovered => self.discovered,
            NodeState::Parsing => self.parsing,
            NodeState::Parsed => self.parsed,
            NodeState::Relations => self.relations,
            NodeState::Linked => self.linked,
            NodeState::Embedding => self.embedding,
            NodeState::Embedded => self.embedded,
            NodeState::Error => self.error,
        }
    }

    fn bump(&mut self, state: NodeState, delta: i64) {
        let slot = match state {
            NodeState::Mentioned => &mut self.mentioned,
            NodeState::Discovered => &mut self.discovered,
            NodeState::Parsing => &mut self.parsing,
            NodeState::Parsed => &mut self.parsed,
            NodeState::Relations => &mut self.relations,
            NodeState::Linked => &mut self.linked,
            NodeState::Embedding => &mut self.embedding,
            NodeState::Embedded => &mut self.embedded,
            NodeState::Error => &mut self.error,
        };
        if delta < 0 {
            *slot = slot.saturating_sub((-delta) as u64);
        } else {
            *slot += delta as u64;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
}

struct Inner {
    records: HashMap<Uuid, FileRecord>,
    stats_by_project: HashMap<String, ProjectStats>,
}

/// Thread-safe, clonable handle (an `Arc` inside), matching the teacher's
/// `SchemaRegistry`/`CodecMap` sharing pattern.
#[derive(Clone)]
pub struct FileStateStore(Arc<RwLock<Inner>>);

impl Default for FileStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStateStore {
    pub fn new() -> Self {
        FileStateStore(Arc::new(RwLock::new(Inner {
            records: HashMap::new(),
            stats_by_project: HashMap::new(),
        })))
    }

    fn wait_for_write(&self) {
        while self.0.is_locked() {
            tracing::debug!("[FileStateStore] waiting for write access");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn wait_for_read(&self) {
        while self.0.is_locked_exclusive() {
            tracing::debug!("[FileStateStore] waiting for read access");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Registers a newly-discovered file/node. Idempotent on re-discovery
    /// of the same uuid (keeps existing state).
    pub fn upsert_discovered(&self, uuid: Uuid, project_id: &str, path: &str, now: i64) {
        self.wait_for_write();
        let mut inner = self.0.write();
        inner
            .records
            .entry(uuid)
            .or_insert_with(|| FileRecord::new(uuid, project_id, path, now));
        let state = inner.records.get(&uuid).map(|r| r.state).unwrap();
        inner
            .stats_by_project
            .entry(project_id.to_string())
            .or_default()
            .bump(state, 1);
    }

    /// Batch transition, per spec.md 4.C: on `new_state = error` increments
    /// `retry_count`; on `new_state = discovered` resets it.
    pub fn transition(
        &self,
        uuids: &[Uuid],
        new_state: NodeState,
        opts: TransitionOpts,
        now: i64,
    ) -> Result<(), IngestError> {
        self.wait_for_write();
        let mut inner = self.0.write();
        for uuid in uuids {
            let record = inner
                .records
                .get(uuid)
                .ok_or_else(|| IngestError::NotFound(format!("unknown node {uuid}")))?;
            validate_transition(record.state, new_state)?;
        }
        for uuid in uuids {
            let record = inner.records.get_mut(uuid).expect("checked above");
            let project = record.project_id.clone();
            let old_state = record.state;
            record.state = new_state;
            record.state_updated_at = now;
            if let Some(hash) = &opts.content_hash {
                record.content_hash = Some(hash.clone());
            }
            match new_state {
                NodeState::Error => {
                    record.retry_count += 1;
                    record.error_type = opts.error_type;
                    record.error_message = opts.error_message.clone();
                }
                NodeState::Discovered => {
                    record.retry_count = 0;
                    record.error_type = None;
                    record.error_message = None;
                }
                _ => {}
            }
            let stats = inner.stats_by_project.entry(project).or_default();
            stats.bump(old_state, -1);
            stats.bump(new_state, 1);
        }
        Ok(())
    }

    pub fn files_in_state(&self, project: &str, states: &[NodeState]) -> Vec<FileRecord> {
        self.wait_for_read();
        let inner = self.0.read();
        let mut out: Vec<FileRecord> = inner
            .records
            .values()
            .filter(|r| r.project_id == project && states.contains(&r.state))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.state_updated_at);
        out
    }

    pub fn retryable_files(&self, project: &str, max_retries: u32) -> Vec<FileRecord> {
        self.wait_for_read();
        let inner = self.0.read();
        let mut out: Vec<FileRecord> = inner
            .records
            .values()
            .filter(|r| {
                r.project_id == project
                    && crate::state_machine::is_retryable(r.state, r.retry_count, max_retries)
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.retry_count, r.state_updated_at));
        out
    }

    /// Returns files stuck in an in-progress state past `threshold_ms`, per
    /// spec.md 4.C; the orchestrator resets them to `discovered` as part of
    /// its per-tick sweep (SPEC_FULL.md section 2).
    pub fn reset_stuck(&self, project: &str, threshold_ms: i64, now: i64) -> Vec<Uuid> {
        const STUCK_STATES: [NodeState; 3] =
            [NodeState::Parsing, NodeState::Relations, NodeState::Embedding];
        self.wait_for_write();
        let mut inner = self.0.write();
        let stuck: Vec<Uuid> = inner
            .records
            .values()
            .filter(|r| {
                r.project_id == project
                    && STUCK_STATES.contains(&r.state)
                    && now - r.state_updated_at > threshold_ms
            })
            .map(|r| r.uuid)
            .collect();
        for uuid in &stuck {
            let record = inner.records.get_mut(uuid).expect("just collected");
            let project = record.project_id.clone();
            let old_state = record.state;
            record.state = NodeState::Discovered;
            record.state_updated_at = now;
            let stats = inner.stats_by_project.entry(project).or_default();
            stats.bump(old_state, -1);
            stats.bump(NodeState::Discovered, 1);
        }
        stuck
    }

    pub fn stats(&self, project: &str) -> ProjectStats {
        self.wait_for_read();
        let inner = self.0.read();
        inner.stats_by_project.get(project).copied().unwrap_or_default()
    }

    pub fn progress(&self, project: &str) -> Progress {
        let stats = self.stats(project);
        let total = stats.total();
        let processed = stats.embedded;
        let percent = if total == 0 {
            0.0
        } else {
            processed as f64 / total as f64
        };
        Progress {
            processed,
            total,
            percent,
        }
    }

    pub fn get(&self, uuid: &Uuid) -> Option<FileRecord> {
        self.wait_for_read();
        self.0.read().records.get(uuid).cloned()
    }
}
