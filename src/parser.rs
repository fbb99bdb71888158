//! Parser Dispatcher (component 4.F).
//!
//! A registry mapping file extensions to parser factories, grounded on
//! `codec/mod.rs`'s `CodecMap`: an `Arc<RwLock<Vec<(String, Factory)>>>`
//! guarded by the same busy-wait-and-log idiom, so registration order is
//! preserved and overriding an extension is a simple linear-scan update
//! rather than a full rebuild. This crate registers no language-specific
//! parsers itself (spec.md Non-goals) — callers bring their own and
//! register them here.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::IngestError;
use crate::linker::RawReference;
use crate::metadata::UuidReuseMap;
use crate::model::{EmbeddingField, NodeKind};

/// One node a parser emits for a single parsed file, prior to system
/// properties being attached (spec.md 4.F "Outputs").
#[derive(Debug, Clone)]
pub struct ParsedNode {
    pub uuid: Uuid,
    pub kind: NodeKind,
    pub name: Option<String>,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub content_hash: String,
    pub embedding_inputs: HashMap<EmbeddingField, String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Everything a parse pass produces for one file: the node set plus the raw
/// references the linker will resolve afterwards.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub nodes: Vec<ParsedNode>,
    pub references: Vec<RawReference>,
}

/// The chunking strategy a parser declares for oversized content, per
/// spec.md 4.H's "chunking config" input to the Embedding Coordinator.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            max_chars: 4000,
            overlap_chars: 200,
        }
    }
}

/// The parser-plugin contract (spec.md 4.F / §6). A registered parser owns
/// exactly one `schema_version` so the dispatcher can tell callers whether a
/// previously-parsed node's shape is still current.
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;
    fn schema_version(&self) -> &str;
    fn supported_extensions(&self) -> &[&str];
    fn node_kinds(&self) -> &[NodeKind];

    /// Parses `content` (the file at `path`, already read), reusing UUIDs
    /// from `reuse` where a node's logical identity is unchanged.
    fn parse(&self, path: &str, content: &[u8], reuse: &UuidReuseMap) -> Result<ParseOutput, IngestError>;

    fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig::default()
    }
}

pub type ParserFactory = fn() -> Box<dyn Parser>;

struct Entry {
    extension: String,
    factory: ParserFactory,
}

/// Thread-safe, clonable registry. Cloning shares the same underlying
/// `Arc<RwLock<_>>`, matching `CodecMap`'s sharing semantics.
#[derive(Clone)]
pub struct ParserRegistry(Arc<RwLock<Vec<Entry>>>);

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry(Arc::new(RwLock::new(Vec::new())))
    }

    /// Registers a parser factory for `extension`, overwriting any existing
    /// registration for the same extension.
    pub fn register(&self, extension: &str, factory: ParserFactory) {
        while self.0.is_locked() {
            tracing::debug!("[ParserRegistry::register] waiting for write access");
            std::thread::sleep(Duration::from_millis(20));
        }
        let mut writer = self.0.write();
        if let Some(entry) = writer.iter_mut().find(|e| e.extension == extension) {
            entry.factory = factory;
        } else {
            writer.push(Entry {
                extension: extension.to_string(),
                factory,
            });
        }
    }

    pub fn factory_for(&self, extension: &str) -> Option<ParserFactory> {
        while self.0.is_locked_exclusive() {
            tracing::debug!("[ParserRegistry::factory_for] waiting for read access");
            std::thread::sleep(Duration::from_millis(20));
        }
        self.0
            .read()
            .iter()
            .find(|e| e.extension == extension)
            .map(|e| e.factory)
    }

    pub fn extensions(&self) -> Vec<String> {
        self.0.read().iter().map(|e| e.extension.clone()).collect()
    }

    /// Dispatches `path` to a registered parser by its extension, per
    /// spec.md 4.F step 1. Extensionless or unregistered files are not an
    /// error at this layer — the orchestrator decides whether to skip them.
    pub fn dispatch(
        &self,
        path: &str,
        content: &[u8],
        reuse: &UuidReuseMap,
    ) -> Result<Option<ParseOutput>, IngestError> {
        let Some(ext) = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
        else {
            return Ok(None);
        };
        let Some(factory) = self.factory_for(ext) else {
            return Ok(None);
        };
        let parser = factory();
        parser.parse(path, content, reuse).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DemoScopeParser;

    fn demo_factory() -> Box<dyn Parser> {
        Box::new(DemoScopeParser)
    }

    #[test]
    fn register_and_dispatch_by_extension() {
        let registry = ParserRegistry::new();
        registry.register("demo", demo_factory);
        let out = registry
            .dispatch("/a.demo", b"scope foo\nend\n", &UuidReuseMap::default())
            .unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn unregistered_extension_yields_none() {
        let registry = ParserRegistry::new();
        let out = registry
            .dispatch("/a.unknown", b"", &UuidReuseMap::default())
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn re_registering_an_extension_overwrites_rather_than_duplicates() {
        let registry = ParserRegistry::new();
        registry.register("demo", demo_factory);
        registry.register("demo", demo_factory);
        assert_eq!(registry.extensions(), vec!["demo".to_string()]);
    }
}
