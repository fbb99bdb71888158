//! # Ingestion Orchestrator (component 4.J)
//!
//! [`IngestionOrchestrator`] is the top-level controller wiring components
//! A through I together: it drains batches from a [`crate::queue::ChangeQueue`],
//! drives each file through capture → parse → link → restore → embed under
//! the project's [`crate::lock::ProjectLock`], and reports aggregated stats.
//! Grounded on `watch.rs`'s `WatchService` (the teacher's long-running,
//! per-project wiring point) but expressed as a pull-based batch runner
//! rather than owning its own background thread — callers drive the tick
//! loop (a CLI runner, a `notify` watcher thread, or a test).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ingestor_core::config::IngestConfig;
//! use ingestor_core::graphstore::InMemoryGraphStore;
//! use ingestor_core::orchestrator::IngestionOrchestrator;
//! use ingestor_core::parser::ParserRegistry;
//! use ingestor_core::testing::{DemoScopeParser, DeterministicEmbedder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let parsers = ParserRegistry::new();
//! parsers.register("demo", || Box::new(DemoScopeParser));
//!
//! let orchestrator = IngestionOrchestrator::new(
//!     "demo-project",
//!     IngestConfig::default(),
//!     InMemoryGraphStore::new(),
//!     parsers,
//!     DeterministicEmbedder::default(),
//! );
//! orchestrator.crawl_and_ingest("./docs").await?;
//! # Ok(())
//! # }
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::IngestConfig;
use crate::embedding::{EmbeddingCoordinator, EmbeddingProvider, EmbeddingRequest};
use crate::error::IngestError;
use crate::graphstore::{GraphNode, GraphStore};
use crate::identity::{coord, derive_uuid};
use crate::linker::{self, AliasTable, LinkOutcome, RawReference, ReferenceKind, RealFs, ScopeSpan};
use crate::metadata::{CapturedEmbedding, CapturedNode, MetadataPreserver};
use crate::metrics::{IngestionMetrics, MetricsSnapshot};
use crate::model::{EdgeKind, EdgeProperties, NodeKind, SystemProperties};
use crate::parser::ParserRegistry;
use crate::queue::{ChangeEvent, ChangeQueue, ChangeType, QueueConfig};
use crate::state_machine::NodeState;
use crate::store::{FileStateStore, TransitionOpts};

const DEFAULT_MODULE_RESOLUTION: &[&str] = &["demo"];

/// Aggregated result of processing one batch, generalizing spec.md 4.H's
/// per-batch stats shape across the whole pipeline rather than just
/// embedding.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub files_processed: u64,
    pub files_errored: u64,
    pub edges_resolved: u64,
    pub edges_pending: u64,
    pub embeddings_generated: u64,
    pub embeddings_restored: u64,
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What one file contributed to a batch: the node identities the linker and
/// embed phases need, kept separate from the graph store so those phases
/// don't have to re-fetch and re-interpret `GraphNode`s just to recover
/// spans or pending embedding text.
struct IngestedFile {
    file_uuid: Uuid,
    path: String,
    node_uuids: Vec<Uuid>,
    scopes: Vec<ScopeSpan>,
    references: Vec<RawReference>,
    embed_requests: Vec<EmbeddingRequest>,
    embeddings_restored: u64,
}

/// Per-project controller. Owns no background thread: `crawl_and_ingest` and
/// `run_one_batch` are called by whatever driver the embedding application
/// chooses (a CLI loop, a `notify` watcher callback, or a test).
pub struct IngestionOrchestrator<G: GraphStore, P: EmbeddingProvider> {
    project_id: String,
    config: IngestConfig,
    graph: Arc<G>,
    parsers: ParserRegistry,
    state_store: FileStateStore,
    queue: ChangeQueue,
    lock: crate::lock::ProjectLock,
    metrics: IngestionMetrics,
    embedder: EmbeddingCoordinator<P>,
    aliases: AliasTable,
    cancel: Arc<AtomicBool>,
}

impl<G: GraphStore + 'static, P: EmbeddingProvider> IngestionOrchestrator<G, P> {
    pub fn new(
        project_id: impl Into<String>,
        config: IngestConfig,
        graph: G,
        parsers: ParserRegistry,
        embedder: P,
    ) -> Self {
        let queue = ChangeQueue::new(QueueConfig {
            batch_interval: std::time::Duration::from_millis(config.batch_interval_ms),
            max_batch_size: config.max_batch_size,
        });
        let embedding_concurrency = config.embedding_concurrency;
        let embedding_batch_size = config.embedding_batch_size;
        IngestionOrchestrator {
            project_id: project_id.into(),
            config,
            graph: Arc::new(graph),
            parsers,
            state_store: FileStateStore::new(),
            queue,
            lock: crate::lock::ProjectLock::new(),
            metrics: IngestionMetrics::new(),
            embedder: EmbeddingCoordinator::new(embedder).with_limits(embedding_concurrency, embedding_batch_size),
            aliases: AliasTable::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn state_store(&self) -> &FileStateStore {
        &self.state_store
    }

    pub fn graph(&self) -> &G {
        self.graph.as_ref()
    }

    /// Pull-based initial crawl (SPEC_FULL.md 2): walks `root` and submits a
    /// `Created` event per file, then drains and processes batches until the
    /// queue is empty. A pull fallback for projects with no filesystem
    /// watcher wired up.
    pub async fn crawl_and_ingest(&self, root: &str) -> Result<BatchStats, IngestError> {
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            self.submit_change(ChangeEvent {
                path: entry.path().to_string_lossy().to_string(),
                change_type: ChangeType::Created,
                project_id: self.project_id.clone(),
            });
        }

        let mut total = BatchStats::default();
        while self.queue.pending_len(&self.project_id) > 0 {
            let stats = self.run_one_batch().await?;
            total.files_processed += stats.files_processed;
            total.files_errored += stats.files_errored;
            total.edges_resolved += stats.edges_resolved;
            total.edges_pending += stats.edges_pending;
            total.embeddings_generated += stats.embeddings_generated;
            total.embeddings_restored += stats.embeddings_restored;
        }
        Ok(total)
    }

    pub fn submit_change(&self, event: ChangeEvent) {
        self.queue.submit(event);
    }

    /// Runs the per-tick `reset_stuck` sweep (SPEC_FULL.md 2: folded into the
    /// batch tick rather than a separate timer) and, if a batch is ready,
    /// processes it end to end per spec.md 4.J.
    pub async fn run_one_batch(&self) -> Result<BatchStats, IngestError> {
        self.state_store
            .reset_stuck(&self.project_id, self.config.stuck_threshold_ms, now_ms());

        let Some(batch) = self.queue.next_batch(&self.project_id).await else {
            return Ok(BatchStats::default());
        };

        let result = self.process_batch(&batch).await;
        if result.is_err() {
            // spec.md 4.J step 8: a batch-level error (lock timeout, linking,
            // or embedding failure) skips the batch rather than discarding
            // it. `next_batch` already removed these events from `pending`
            // via `mem::take`, so they must be resubmitted before the
            // in-flight flag clears, or they're lost for good.
            for event in batch {
                self.queue.submit(event);
            }
        }
        self.queue.complete_batch(&self.project_id);
        self.metrics.record_batch_completed();
        result
    }

    async fn process_batch(&self, batch: &[ChangeEvent]) -> Result<BatchStats, IngestError> {
        let holder = format!("orchestrator:{}", self.project_id);
        let token = self
            .lock
            .acquire(&holder, &self.project_id, Some("batch ingestion".into()), 30_000)
            .await?;

        let result = self.process_batch_locked(batch).await;
        self.lock.release(token);
        result
    }

    /// Steps 3-7 of spec.md 4.J, run under the lock acquired by
    /// [`Self::process_batch`]. Split out so the lock is released on every
    /// exit path, including the early returns from linking and embedding
    /// errors, rather than only the success path at the end of a single
    /// function.
    async fn process_batch_locked(&self, batch: &[ChangeEvent]) -> Result<BatchStats, IngestError> {
        let mut stats = BatchStats::default();
        let mut ingested = Vec::new();

        for event in batch {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            match event.change_type {
                ChangeType::Deleted => {
                    self.cascade_delete(&event.path);
                }
                ChangeType::Created | ChangeType::Updated => match self.ingest_file(&event.path).await {
                    Ok(Some(file)) => ingested.push(file),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(path = %event.path, error = %err, "[IngestionOrchestrator] file failed during ingest");
                        stats.files_errored += 1;
                        self.metrics.record_errored(1);
                    }
                },
            }
        }
        stats.files_processed += ingested.len() as u64;
        stats.embeddings_restored += ingested.iter().map(|f| f.embeddings_restored).sum::<u64>();
        self.metrics.record_embeddings_restored(stats.embeddings_restored);

        let embed_requests = self.link_files(&ingested, &mut stats)?;
        self.resolve_pending_imports(&mut stats);
        self.embed_all(&ingested, embed_requests, &mut stats).await?;

        Ok(stats)
    }

    fn cascade_delete(&self, path: &str) {
        let members = self.graph.nodes_for_file(&self.project_id, path);
        for uuid in members {
            let _ = self.graph.remove_node(uuid);
            if self.state_store.get(&uuid).is_some() {
                let _ = self.state_store.transition(
                    &[uuid],
                    NodeState::Discovered,
                    TransitionOpts::default(),
                    now_ms(),
                );
            }
        }
    }

    /// Steps 2-4 of spec.md 4.J for one file: capture existing nodes, parse,
    /// upsert, transition to `parsed`, and build the embedding requests the
    /// restore plan didn't already satisfy.
    async fn ingest_file(&self, path: &str) -> Result<Option<IngestedFile>, IngestError> {
        let Some(ext) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) else {
            return Ok(None);
        };
        if self.parsers.factory_for(ext).is_none() {
            return Ok(None);
        }

        let content = tokio::fs::read(path).await?;
        let file_uuid = derive_uuid(&coord::file(path));
        self.state_store.upsert_discovered(file_uuid, &self.project_id, path, now_ms());
        self.metrics.record_discovered(1);
        self.state_store
            .transition(&[file_uuid], NodeState::Parsing, TransitionOpts::default(), now_ms())?;

        let captured = self.capture_live_nodes(path);
        let reuse = MetadataPreserver::capture(&captured);

        let output = match self.parsers.dispatch(path, &content, &reuse) {
            Ok(Some(output)) => output,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.state_store.transition(
                    &[file_uuid],
                    NodeState::Error,
                    TransitionOpts {
                        error_type: Some(crate::model::ErrorKind::Parse),
                        error_message: Some(err.to_string()),
                        content_hash: None,
                    },
                    now_ms(),
                )?;
                return Err(err);
            }
        };

        let file_content_hash = crate::identity::content_hash_hex(&content);
        let mut file_props = SystemProperties::new(file_uuid, &self.project_id, NodeKind::File, now_ms());
        file_props.state = NodeState::Parsed;
        file_props.content_hash = Some(file_content_hash);
        file_props.parsed_at = Some(now_ms());
        self.graph.upsert_node(GraphNode {
            uuid: file_uuid,
            file: path.to_string(),
            properties: file_props,
            embeddings: Default::default(),
        })?;

        let mut node_uuids = vec![file_uuid];
        let mut scopes = Vec::new();
        let mut reemitted = std::collections::HashMap::new();

        for node in &output.nodes {
            let mut hashes = std::collections::HashMap::new();
            for (field, text) in &node.embedding_inputs {
                hashes.insert(*field, crate::identity::content_hash_hex(text.as_bytes()));
            }
            reemitted.insert(node.uuid, hashes);

            let mut props = SystemProperties::new(node.uuid, &self.project_id, node.kind, now_ms());
            props.state = NodeState::Parsed;
            props.content_hash = Some(node.content_hash.clone());
            props.parsed_at = Some(now_ms());
            props.name = node.name.clone();
            props.start_line = node.start_line;
            props.end_line = node.end_line;

            self.graph.upsert_node(GraphNode {
                uuid: node.uuid,
                file: path.to_string(),
                properties: props,
                embeddings: Default::default(),
            })?;
            self.graph
                .upsert_edge(file_uuid, node.uuid, EdgeKind::Contains, EdgeProperties::default())?;

            if let (Some(start), Some(end)) = (node.start_line, node.end_line) {
                scopes.push(ScopeSpan {
                    uuid: node.uuid,
                    start_line: start,
                    end_line: end,
                });
            }
            node_uuids.push(node.uuid);
            self.state_store
                .upsert_discovered(node.uuid, &self.project_id, path, now_ms());
            self.metrics.record_discovered(1);
            self.state_store
                .transition(&[node.uuid], NodeState::Parsing, TransitionOpts::default(), now_ms())?;
            self.state_store
                .transition(&[node.uuid], NodeState::Parsed, TransitionOpts::default(), now_ms())?;
            self.metrics.record_parsed(1);
        }

        let restore_plan = MetadataPreserver::plan_restore(
            &captured,
            &reemitted,
            &self.config.embedding_provider,
            &self.config.embedding_model,
        );

        let mut embed_requests = Vec::new();
        let mut embeddings_restored = 0u64;
        for node in &output.nodes {
            let restored_fields = restore_plan.restored_fields(&node.uuid);
            if let Some(fields) = restored_fields {
                if let Some(mut graph_node) = self.graph.get_node(node.uuid) {
                    for (field, embedding) in fields {
                        graph_node.properties.embedding_hashes.insert(*field, embedding.hash.clone());
                        graph_node.embeddings.insert(*field, embedding.vector.clone());
                        embeddings_restored += 1;
                    }
                    self.graph.upsert_node(graph_node)?;
                }
            }
            for (field, text) in &node.embedding_inputs {
                let already_restored = restored_fields.is_some_and(|f| f.contains_key(field));
                if !already_restored {
                    embed_requests.push(EmbeddingRequest {
                        uuid: node.uuid,
                        field: *field,
                        text: text.clone(),
                    });
                }
            }
        }

        self.state_store
            .transition(&[file_uuid], NodeState::Parsed, TransitionOpts::default(), now_ms())?;
        self.metrics.record_parsed(1);

        Ok(Some(IngestedFile {
            file_uuid,
            path: path.to_string(),
            node_uuids,
            scopes,
            references: output.references,
            embed_requests,
            embeddings_restored,
        }))
    }

    /// Captures the live nodes belonging to `path` before its destructive
    /// re-parse, per spec.md 4.B.
    fn capture_live_nodes(&self, path: &str) -> Vec<CapturedNode> {
        self.graph
            .nodes_for_file(&self.project_id, path)
            .into_iter()
            .filter_map(|uuid| self.graph.get_node(uuid))
            .map(|node| CapturedNode {
                uuid: node.uuid,
                label: format!("{:?}", node.properties.kind),
                file: node.file.clone(),
                name: node.properties.name.clone(),
                start_line: node.properties.start_line,
                end_line: node.properties.end_line,
                content_hash: node.properties.content_hash.clone(),
                embeddings: node
                    .embeddings
                    .iter()
                    .filter_map(|(field, vector)| {
                        node.properties.embedding_hashes.get(field).map(|hash| {
                            (
                                *field,
                                CapturedEmbedding {
                                    vector: vector.clone(),
                                    hash: hash.clone(),
                                    provider: node.properties.embedding_provider.clone().unwrap_or_default(),
                                    model: node.properties.embedding_model.clone().unwrap_or_default(),
                                },
                            )
                        })
                    })
                    .collect(),
            })
            .collect()
    }

    /// Resolves every reference each ingested file contributed and
    /// transitions its nodes from `parsed` through `relations`/`linked`.
    /// Returns the embed requests accumulated during parse, passed through
    /// unchanged since linking doesn't affect which fields need embedding.
    fn link_files(&self, ingested: &[IngestedFile], stats: &mut BatchStats) -> Result<Vec<EmbeddingRequest>, IngestError> {
        let fs = RealFs;
        let mut all_requests = Vec::new();

        for file in ingested {
            let importer_dir = std::path::Path::new(&file.path)
                .parent()
                .and_then(|p| p.to_str())
                .unwrap_or(".");

            for reference in &file.references {
                let outcome = linker::resolve_reference(
                    reference,
                    importer_dir,
                    &self.aliases,
                    DEFAULT_MODULE_RESOLUTION,
                    &fs,
                    linker::DEFAULT_MAX_CHASE_DEPTH,
                );
                let source_uuid = linker::enclosing_scope(&file.scopes, reference.line, file.file_uuid);
                self.materialize_link(source_uuid, reference, outcome, stats);
            }

            // Parsed -> Relations -> Linked and the Parsed -> Linked shortcut
            // are both legal (spec.md 4.E), so the relations hop is attempted
            // unconditionally and its result ignored rather than special-
            // casing files with no references.
            self.state_store
                .transition(&file.node_uuids, NodeState::Relations, TransitionOpts::default(), now_ms())
                .ok();
            self.state_store
                .transition(&file.node_uuids, NodeState::Linked, TransitionOpts::default(), now_ms())?;

            for uuid in &file.node_uuids {
                if let Some(mut node) = self.graph.get_node(*uuid) {
                    node.properties.state = NodeState::Linked;
                    node.properties.linked_at = Some(now_ms());
                    let _ = self.graph.upsert_node(node);
                }
            }

            all_requests.extend(file.embed_requests.iter().cloned());
        }
        Ok(all_requests)
    }

    fn materialize_link(&self, source_uuid: Uuid, reference: &RawReference, outcome: LinkOutcome, stats: &mut BatchStats) {
        match outcome {
            LinkOutcome::ExternalLibrary { package_name } => {
                let lib_uuid = derive_uuid(&coord::lib(&package_name));
                if self.graph.get_node(lib_uuid).is_none() {
                    let _ = self.graph.upsert_node(GraphNode {
                        uuid: lib_uuid,
                        file: String::new(),
                        properties: SystemProperties::new(
                            lib_uuid,
                            &self.project_id,
                            NodeKind::ExternalLibrary,
                            now_ms(),
                        ),
                        embeddings: Default::default(),
                    });
                }
                let _ = self.graph.upsert_edge(
                    source_uuid,
                    lib_uuid,
                    EdgeKind::ImportsLibrary,
                    linker::edge_properties(&reference.symbols, reference.line),
                );
                stats.edges_resolved += 1;
                self.metrics.record_edges_resolved(1);
            }
            LinkOutcome::Resolved { target_file, symbols } => {
                let target_uuid = derive_uuid(&coord::file(&target_file));
                if self.graph.get_node(target_uuid).is_some() {
                    let _ = self.graph.upsert_edge(
                        source_uuid,
                        target_uuid,
                        EdgeKind::Consumes,
                        linker::edge_properties(&symbols, reference.line),
                    );
                    stats.edges_resolved += 1;
                    self.metrics.record_edges_resolved(1);
                } else {
                    self.park_pending(source_uuid, &target_file, &symbols, reference.line, stats);
                }
            }
            LinkOutcome::Pending { import_path, symbols } => {
                self.park_pending(source_uuid, &import_path, &symbols, reference.line, stats);
            }
        }
    }

    fn park_pending(&self, source_uuid: Uuid, import_path: &str, symbols: &[String], line: u32, stats: &mut BatchStats) {
        let placeholder = linker::pending_placeholder_uuid(source_uuid, import_path);
        if self.graph.get_node(placeholder).is_none() {
            let _ = self.graph.upsert_node(GraphNode {
                uuid: placeholder,
                file: String::new(),
                properties: SystemProperties::new(placeholder, &self.project_id, NodeKind::PendingImport, now_ms()),
                embeddings: Default::default(),
            });
        }
        let mut props = linker::edge_properties(symbols, line);
        props.import_path = Some(import_path.to_string());
        let _ = self
            .graph
            .upsert_edge(source_uuid, placeholder, EdgeKind::PendingImport, props);
        stats.edges_pending += 1;
        self.metrics.record_edges_pending(1);
    }

    /// Sweeps every `PendingImport` placeholder and retries resolution now
    /// that this batch may have ingested the file it was waiting on
    /// (spec.md 8, property 6 / scenario S6). A placeholder is keyed by
    /// `(from_uuid, import_path)`, so once its one incoming edge resolves it
    /// has no remaining referents and is removed outright.
    fn resolve_pending_imports(&self, stats: &mut BatchStats) {
        let fs = RealFs;
        for placeholder in self.graph.nodes_by_kind(&self.project_id, NodeKind::PendingImport) {
            for (source_uuid, kind, props) in self.graph.edges_to(placeholder) {
                if kind != EdgeKind::PendingImport {
                    continue;
                }
                let Some(import_path) = props.import_path.clone() else {
                    continue;
                };
                let Some(source_node) = self.graph.get_node(source_uuid) else {
                    continue;
                };
                let importer_dir = std::path::Path::new(&source_node.file)
                    .parent()
                    .and_then(|p| p.to_str())
                    .unwrap_or(".");

                let reference = RawReference {
                    kind: ReferenceKind::Import,
                    symbols: props.symbols.clone(),
                    is_local: true,
                    raw_path: import_path,
                    line: props.line.unwrap_or(0),
                };
                let outcome = linker::resolve_reference(
                    &reference,
                    importer_dir,
                    &self.aliases,
                    DEFAULT_MODULE_RESOLUTION,
                    &fs,
                    linker::DEFAULT_MAX_CHASE_DEPTH,
                );
                let LinkOutcome::Resolved { target_file, symbols } = outcome else {
                    continue;
                };
                let target_uuid = derive_uuid(&coord::file(&target_file));
                if self.graph.get_node(target_uuid).is_none() {
                    continue;
                }

                let mut resolved_props = linker::edge_properties(&symbols, reference.line);
                resolved_props.resolved_at = Some(now_ms());
                if self
                    .graph
                    .upsert_edge(source_uuid, target_uuid, EdgeKind::Consumes, resolved_props)
                    .is_ok()
                {
                    let _ = self.graph.remove_edge(source_uuid, placeholder, EdgeKind::PendingImport);
                    stats.edges_resolved += 1;
                    self.metrics.record_edges_resolved(1);
                }
            }

            if self.graph.edges_to(placeholder).is_empty() {
                let _ = self.graph.remove_node(placeholder);
            }
        }
    }

    /// Embeds the batch's accumulated requests (step 7 of spec.md 4.J,
    /// still under the held lock) and writes vectors back onto the graph
    /// nodes they belong to, transitioning each touched node to `embedded`
    /// or `error`.
    async fn embed_all(&self, ingested: &[IngestedFile], requests: Vec<EmbeddingRequest>, stats: &mut BatchStats) -> Result<(), IngestError> {
        let embedding_uuids: Vec<Uuid> = ingested
            .iter()
            .flat_map(|f| f.node_uuids.iter().copied())
            .collect();
        if embedding_uuids.is_empty() {
            return Ok(());
        }
        self.state_store
            .transition(&embedding_uuids, NodeState::Embedding, TransitionOpts::default(), now_ms())?;

        let results = self.embedder.embed_all(requests).await;
        let grouped = crate::embedding::group_by_node(results);

        for uuid in &embedding_uuids {
            let mut error_message = None;
            if let Some(fields) = grouped.get(uuid) {
                if let Some(mut node) = self.graph.get_node(*uuid) {
                    for (field, result) in fields {
                        match result {
                            Ok(embedded) => {
                                node.properties.embedding_hashes.insert(*field, embedded.hash.clone());
                                node.embeddings.insert(*field, embedded.vector.clone());
                                stats.embeddings_generated += 1;
                                self.metrics.record_embeddings_generated(1);
                            }
                            Err(err) => error_message = Some(err.to_string()),
                        }
                    }
                    node.properties.embedding_provider = Some(self.config.embedding_provider.clone());
                    node.properties.embedding_model = Some(self.config.embedding_model.clone());
                    node.properties.embedded_at = Some(now_ms());
                    if error_message.is_none() {
                        node.properties.state = NodeState::Embedded;
                    }
                    self.graph.upsert_node(node)?;
                }
            } else if let Some(mut node) = self.graph.get_node(*uuid) {
                node.properties.state = NodeState::Embedded;
                node.properties.embedded_at = Some(now_ms());
                self.graph.upsert_node(node)?;
            }

            if let Some(message) = error_message {
                self.state_store.transition(
                    &[*uuid],
                    NodeState::Error,
                    TransitionOpts {
                        error_type: Some(crate::model::ErrorKind::Embed),
                        error_message: Some(message),
                        content_hash: None,
                    },
                    now_ms(),
                )?;
            } else {
                self.state_store
                    .transition(&[*uuid], NodeState::Embedded, TransitionOpts::default(), now_ms())?;
            }
        }
        Ok(())
    }
}
