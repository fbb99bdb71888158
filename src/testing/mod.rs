//! Deterministic toy parser and embedder used by this crate's own tests and
//! available to downstream integration tests, per the "supplemented
//! features" note in SPEC_FULL.md 2. Neither is a production parser or
//! embedding backend — this crate ships no language-specific parsers
//! (spec.md Non-goals) and no real embedding model.
use std::collections::HashMap;

use uuid::Uuid;

use crate::error::IngestError;
use crate::identity::{coord, derive_uuid, schema_hash};
use crate::linker::{RawReference, ReferenceKind};
use crate::metadata::UuidReuseMap;
use crate::model::{EmbeddingField, NodeKind};
use crate::parser::{ChunkingConfig, ParseOutput, Parser, ParsedNode};

/// Parses a toy `scope <name>` / `end` block format plus `use "<path>"`
/// reference lines, purely so tests exercise the real dispatch/link/embed
/// pipeline without depending on a real language grammar.
#[derive(Default, Clone, Copy)]
pub struct DemoScopeParser;

impl Parser for DemoScopeParser {
    fn name(&self) -> &str {
        "demo-scope"
    }

    fn schema_version(&self) -> &str {
        "demo-scope-v1"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["demo"]
    }

    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::Scope]
    }

    fn parse(&self, path: &str, content: &[u8], reuse: &UuidReuseMap) -> Result<ParseOutput, IngestError> {
        let text = std::str::from_utf8(content)
            .map_err(|e| IngestError::ParseError {
                path: path.to_string(),
                message: format!("not valid utf8: {e}"),
            })?;

        let mut nodes = Vec::new();
        let mut references = Vec::new();
        let mut open: Option<(String, usize)> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("scope ") {
                if open.is_some() {
                    return Err(IngestError::ParseError {
                        path: path.to_string(),
                        message: format!("nested scope at line {line_no}"),
                    });
                }
                open = Some((rest.trim().to_string(), idx + 1));
            } else if trimmed == "end" {
                let Some((name, start_line)) = open.take() else {
                    return Err(IngestError::ParseError {
                        path: path.to_string(),
                        message: format!("unmatched end at line {line_no}"),
                    });
                };
                let start = start_line as u32;
                let by_line = reuse.candidates(&crate::metadata::ReuseKey::ByNameAndLine {
                    file: path.to_string(),
                    name: name.clone(),
                    start_line: start,
                });
                // A scope whose start_line shifted because of an unrelated
                // edit above it won't match ByNameAndLine; fall back to the
                // line-independent key before minting a fresh identity.
                let by_name = reuse.candidates(&crate::metadata::ReuseKey::ByName {
                    file: path.to_string(),
                    name: name.clone(),
                });
                let uuid = by_line
                    .first()
                    .or_else(|| by_name.first())
                    .copied()
                    .unwrap_or_else(|| derive_uuid(&coord::scope(path, Some(&name), &start.to_string())));

                let body = text
                    .lines()
                    .skip(start_line)
                    .take(idx - start_line)
                    .collect::<Vec<_>>()
                    .join("\n");
                let mut embedding_inputs = HashMap::new();
                embedding_inputs.insert(EmbeddingField::Name, name.clone());
                embedding_inputs.insert(EmbeddingField::Content, body.clone());

                nodes.push(ParsedNode {
                    uuid,
                    kind: NodeKind::Scope,
                    name: Some(name),
                    start_line: Some(start),
                    end_line: Some(line_no),
                    content_hash: crate::identity::content_hash_hex(body.as_bytes()),
                    embedding_inputs,
                    properties: Default::default(),
                });
            } else if let Some(rest) = trimmed.strip_prefix("use \"") {
                if let Some(raw_path) = rest.strip_suffix('"') {
                    references.push(RawReference {
                        kind: ReferenceKind::Import,
                        symbols: Vec::new(),
                        is_local: raw_path.starts_with('.'),
                        raw_path: raw_path.to_string(),
                        line: line_no,
                    });
                }
            }
        }

        if open.is_some() {
            return Err(IngestError::ParseError {
                path: path.to_string(),
                message: "unclosed scope".to_string(),
            });
        }

        Ok(ParseOutput { nodes, references })
    }

    fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_chars: 2000,
            overlap_chars: 100,
        }
    }
}

/// Declares this parser's schema hash the way a real one would, over its
/// node label and the property names it always sets.
pub fn demo_scope_schema_hash() -> String {
    schema_hash("Scope", &["name", "start_line", "end_line"])
}

/// An embedding provider that derives a fixed-width vector from a text's
/// content hash instead of calling a model — deterministic across runs, so
/// tests can assert on exact vectors without mocking network calls.
pub struct DeterministicEmbedder {
    pub dimensions: usize,
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        DeterministicEmbedder { dimensions: 8 }
    }
}

#[async_trait::async_trait]
impl crate::embedding::EmbeddingProvider for DeterministicEmbedder {
    fn name(&self) -> &str {
        "deterministic-test-embedder"
    }

    fn model(&self) -> &str {
        "hash-v1"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

impl DeterministicEmbedder {
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let hash = crate::identity::content_hash(text.as_bytes());
        (0..self.dimensions)
            .map(|i| hash[i % hash.len()] as f32 / 255.0)
            .collect()
    }
}

/// Stable identity for nodes a demo file contributes, for use in tests that
/// need to predict UUIDs without going through a full parse.
pub fn demo_scope_uuid(path: &str, name: &str, start_line: u32) -> Uuid {
    derive_uuid(&coord::scope(path, Some(name), &start_line.to_string()))
}
