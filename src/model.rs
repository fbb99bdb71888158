//! Node/edge system properties (spec.md 3.2/3.3) and node kinds.
//!
//! Grounded on `properties.rs`'s system-property shape and `event.rs`'s
//! enum-with-typed-payload idiom, generalized from the teacher's belief-graph
//! vocabulary to content-node ingestion vocabulary.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::NodeState;

/// Disjoint from structural nodes (file, directory) per the GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
    Scope,
    MarkdownDocument,
    MarkdownSection,
    CodeBlock,
    Spreadsheet,
    Pdf,
    WordDocument,
    WebPage,
    ExternalLibrary,
    PendingImport,
}

impl NodeKind {
    pub fn is_structural(self) -> bool {
        matches!(self, NodeKind::File | NodeKind::Directory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    Relations,
    Embed,
}

/// The embedding fields a content node may carry (spec.md 3.2's "per-field
/// embedding hashes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmbeddingField {
    Name,
    Content,
    Description,
}

impl EmbeddingField {
    pub const ALL: [EmbeddingField; 3] = [
        EmbeddingField::Name,
        EmbeddingField::Content,
        EmbeddingField::Description,
    ];
}

/// The fixed system-property set every derived content node carries,
/// disjoint from user-facing/parser-emitted fields (spec.md 3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProperties {
    pub uuid: Uuid,
    pub project_id: String,
    pub kind: NodeKind,
    /// Parser-assigned logical name, carried through so a later re-parse's
    /// Metadata Preserver capture can index by `(file, name)` without the
    /// graph store needing a separate lookup table.
    pub name: Option<String>,
    /// Span the node occupied at its last parse, carried so the Metadata
    /// Preserver can also index by `(file, name, start_line)` and fall back
    /// to the line-independent key when an unrelated edit shifts this span.
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,

    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed_at: Option<i64>,

    pub state: NodeState,
    pub state_changed_at: i64,
    pub parsed_at: Option<i64>,
    pub linked_at: Option<i64>,
    pub embedded_at: Option<i64>,

    pub parser_name: Option<String>,
    pub schema_version: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,

    pub content_hash: Option<String>,
    pub previous_content_hash: Option<String>,
    pub content_version: u64,

    pub error_type: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub error_at: Option<i64>,
    pub retry_count: u32,

    /// Hash of the exact text fed to the embedder for each field, keyed by
    /// field. Absence of an entry means no vector is held for that field
    /// (invariant 3 of spec.md 3.4).
    pub embedding_hashes: BTreeMap<EmbeddingField, String>,

    /// Per-scope dirty flag, per the Open Question decision in DESIGN.md:
    /// an input to the Embedding Coordinator, not a state-machine state.
    pub embeddings_dirty: bool,
}

impl SystemProperties {
    pub fn new(uuid: Uuid, project_id: impl Into<String>, kind: NodeKind, now: i64) -> Self {
        SystemProperties {
            uuid,
            project_id: project_id.into(),
            kind,
            name: None,
            start_line: None,
            end_line: None,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            state: NodeState::Mentioned,
            state_changed_at: now,
            parsed_at: None,
            linked_at: None,
            embedded_at: None,
            parser_name: None,
            schema_version: None,
            embedding_provider: None,
            embedding_model: None,
            content_hash: None,
            previous_content_hash: None,
            content_version: 0,
            error_type: None,
            error_message: None,
            error_at: None,
            retry_count: 0,
            embedding_hashes: BTreeMap::new(),
            embeddings_dirty: false,
        }
    }

    pub fn has_embedding(&self, field: EmbeddingField) -> bool {
        self.embedding_hashes.contains_key(&field)
    }
}

/// Typed directed edge kinds recognized by the core (spec.md 3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Contains,
    DefinedIn,
    HasParent,
    Consumes,
    ConsumedBy,
    InheritsFrom,
    PendingImport,
    ImportsLibrary,
    InDocument,
    HasEmbeddingChunk,
    MentionsFile,
    CanonicalIs,
    HasTag,
    ContainsEntity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeProperties {
    pub symbols: Vec<String>,
    pub line: Option<u32>,
    pub resolved_at: Option<i64>,
    pub import_path: Option<String>,
}
