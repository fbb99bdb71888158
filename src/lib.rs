//! # ingestor-core
//!
//! A Rust library that turns a directory of source files and documents into
//! a queryable knowledge graph, keeping the graph in sync as files change.
//!
//! ## Overview
//!
//! `ingestor-core` watches (or crawls) a project, dispatches each changed
//! file to a registered parser, derives deterministic identities for the
//! nodes the parser emits, resolves cross-file references into typed edges,
//! and schedules embedding generation for the fields that changed — all
//! without re-embedding or re-identifying content that didn't actually
//! change.
//!
//! ### Key properties
//!
//! - **Deterministic identity**: every node's UUID is derived from a stable
//!   coordinate tuple ([`identity`]), not minted fresh each run, so the same
//!   file produces the same graph on every ingest.
//! - **Change-aware**: a debounced [`queue::ChangeQueue`] batches filesystem
//!   events per project; [`metadata`] decides, per embedding field, whether
//!   a re-parsed node's old vector can be kept.
//! - **Pluggable parsing**: [`parser::ParserRegistry`] dispatches by file
//!   extension to a [`parser::Parser`] implementation; this crate provides no
//!   language-specific parsers itself.
//! - **Reference resolution**: [`linker`] classifies, resolves, and chases
//!   barrel re-exports for references a parser emits, parking anything that
//!   can't yet be resolved as a pending import.
//! - **Storage-agnostic graph**: [`graphstore::GraphStore`] is a trait; this
//!   crate ships an in-memory reference implementation
//!   ([`graphstore::InMemoryGraphStore`]) alongside it.
//!
//! ## Architecture
//!
//! - **[`state_machine`]**: the legal per-node lifecycle transitions
//! - **[`identity`]**: coordinate-tuple UUID and content-hash derivation
//! - **[`metadata`]**: identity/embedding capture-and-restore across re-parse
//! - **[`store`]**: per-project file/node state tracking
//! - **[`queue`]**: debounced change batching
//! - **[`linker`]**: reference classification, resolution, and re-export chasing
//! - **[`graphstore`]**: the external graph-store contract
//! - **[`lock`]**: per-project mutual exclusion between ingestion and readers
//! - **[`embedding`]**: retrying, rate-limited embedding generation
//! - **[`parser`]**: the parser-plugin registry and contract
//! - **[`config`]**: project ingestion configuration
//! - **[`orchestrator`]**: wires the above into the end-to-end batch pipeline
//! - **[`metrics`]**: ambient operational counters
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ingestor_core::config::IngestConfig;
//! use ingestor_core::graphstore::InMemoryGraphStore;
//! use ingestor_core::orchestrator::IngestionOrchestrator;
//! use ingestor_core::parser::ParserRegistry;
//! use ingestor_core::testing::DeterministicEmbedder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::from_toml_str(include_str!("../tests/fixtures/ingest.toml"))?;
//! let graph = InMemoryGraphStore::new();
//! let parsers = ParserRegistry::new();
//! let orchestrator = IngestionOrchestrator::new(
//!     "demo-project",
//!     config,
//!     graph,
//!     parsers,
//!     DeterministicEmbedder::default(),
//! );
//! orchestrator.crawl_and_ingest("./docs").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### File watching (requires the `service` feature)
//!
//! ```rust,no_run
//! # #[cfg(feature = "service")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use ingestor_core::queue::{ChangeQueue, QueueConfig};
//!
//! let queue = ChangeQueue::new(QueueConfig::default());
//! // A `notify` watcher submits events to `queue`; the orchestrator's
//! // per-project tick loop drains `queue.next_batch(..)`.
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod graphstore;
pub mod identity;
pub mod linker;
pub mod lock;
pub mod metadata;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod queue;
pub mod state_machine;
pub mod store;

/// Deterministic toy parser/embedder for tests and examples. Not meant for
/// production ingestion, but public so integration tests (a separate crate)
/// can use it.
pub mod testing;

pub use error::IngestError;
