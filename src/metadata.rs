//! Metadata Preserver (component 4.B).
//!
//! Captures identity and embeddings of live nodes before a destructive
//! re-parse, so unrelated edits don't force needless re-embedding. Grounded
//! on `db.rs`'s `Transaction::track_file_mtime` (capture-before-mutate) and
//! on `other_examples`'s `CachedEmbedder`/`ChangeSet` preserve-vs-regenerate
//! decision: a vector is kept only if its exact input hash, provider, and
//! model all still match.
use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{EmbeddingField, SystemProperties};

/// What was captured for one live node before re-parse.
#[derive(Debug, Clone)]
pub struct CapturedNode {
    pub uuid: Uuid,
    pub label: String,
    pub file: String,
    pub name: Option<String>,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub content_hash: Option<String>,
    pub embeddings: HashMap<EmbeddingField, CapturedEmbedding>,
}

#[derive(Debug, Clone)]
pub struct CapturedEmbedding {
    pub vector: Vec<f32>,
    pub hash: String,
    pub provider: String,
    pub model: String,
}

/// Key used by the UUID reuse map: `(file, name)` or `(file, name,
/// start_line)`, per spec.md 4.B. Using a single enum key instead of two
/// maps keeps a single lookup path for callers that may or may not know the
/// start line yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReuseKey {
    ByName { file: String, name: String },
    ByNameAndLine {
        file: String,
        name: String,
        start_line: u32,
    },
}

/// Candidate UUIDs a parser should prefer when it emits a node matching the
/// same logical identity.
#[derive(Debug, Default, Clone)]
pub struct UuidReuseMap {
    candidates: HashMap<ReuseKey, Vec<Uuid>>,
}

impl UuidReuseMap {
    pub fn candidates(&self, key: &ReuseKey) -> &[Uuid] {
        self.candidates.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Decision for one captured UUID's embedding fields: restore or drop
/// (regenerate in the embed phase).
#[derive(Debug, Default, Clone)]
pub struct RestorePlan {
    pub restore: HashMap<Uuid, HashMap<EmbeddingField, CapturedEmbedding>>,
}

impl RestorePlan {
    pub fn restored_fields(&self, uuid: &Uuid) -> Option<&HashMap<EmbeddingField, CapturedEmbedding>> {
        self.restore.get(uuid)
    }
}

pub struct MetadataPreserver;

impl MetadataPreserver {
    /// Captures live nodes for a file before its destructive re-parse,
    /// producing the UUID reuse map the parser is given (spec.md 4.B).
    pub fn capture(live_nodes: &[CapturedNode]) -> UuidReuseMap {
        let mut map = UuidReuseMap::default();
        for node in live_nodes {
            if let Some(name) = &node.name {
                map.candidates
                    .entry(ReuseKey::ByName {
                        file: node.file.clone(),
                        name: name.clone(),
                    })
                    .or_default()
                    .push(node.uuid);
                if let Some(start_line) = node.start_line {
                    map.candidates
                        .entry(ReuseKey::ByNameAndLine {
                            file: node.file.clone(),
                            name: name.clone(),
                            start_line,
                        })
                        .or_default()
                        .push(node.uuid);
                }
            }
        }
        map
    }

    /// Builds the restore plan: for each captured node that the re-parse
    /// re-emitted under the same UUID, decide per embedding field whether
    /// to keep the old vector.
    ///
    /// `reemitted`: uuid -> the hash of the text that would currently feed
    /// each embedding field, as computed from the freshly parsed node.
    /// `current_provider`/`current_model`: the embedding configuration in
    /// force right now.
    pub fn plan_restore(
        captured: &[CapturedNode],
        reemitted: &HashMap<Uuid, HashMap<EmbeddingField, String>>,
        current_provider: &str,
        current_model: &str,
    ) -> RestorePlan {
        let mut plan = RestorePlan::default();
        for node in captured {
            let Some(fresh_hashes) = reemitted.get(&node.uuid) else {
                continue; // node wasn't re-emitted: UUID not reused, nothing to restore
            };
            let mut kept = HashMap::new();
            for (field, captured_embedding) in &node.embeddings {
                let same_provider_model = captured_embedding.provider == current_provider
                    && captured_embedding.model == current_model;
                let same_text = fresh_hashes
                    .get(field)
                    .is_some_and(|h| *h == captured_embedding.hash);
                if same_provider_model && same_text {
                    kept.insert(*field, captured_embedding.clone());
                }
            }
            if !kept.is_empty() {
                plan.restore.insert(node.uuid, kept);
            }
        }
        plan
    }

    /// Applies a restore plan's kept vectors onto a freshly (re-)parsed
    /// node's system properties, setting `embedding_hashes` for the fields
    /// that were restored. Fields absent from the plan remain un-set and
    /// are left for the Embedding Coordinator to (re)generate.
    pub fn apply(plan: &RestorePlan, uuid: &Uuid, props: &mut SystemProperties) {
        if let Some(fields) = plan.restored_fields(uuid) {
            for (field, embedding) in fields {
                props.embedding_hashes.insert(*field, embedding.hash.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::NodeState;

    fn node(uuid: Uuid, file: &str, name: &str, start_line: u32) -> CapturedNode {
        CapturedNode {
            uuid,
            label: "Function".into(),
            file: file.into(),
            name: Some(name.into()),
            start_line: Some(start_line),
            end_line: Some(start_line + 5),
            content_hash: Some("abc".into()),
            embeddings: HashMap::new(),
        }
    }

    #[test]
    fn capture_indexes_by_name_and_by_name_and_line() {
        let uuid = Uuid::new_v4();
        let nodes = vec![node(uuid, "/a.rs", "foo", 10)];
        let map = MetadataPreserver::capture(&nodes);
        let by_name = ReuseKey::ByName {
            file: "/a.rs".into(),
            name: "foo".into(),
        };
        let by_line = ReuseKey::ByNameAndLine {
            file: "/a.rs".into(),
            name: "foo".into(),
            start_line: 10,
        };
        assert_eq!(map.candidates(&by_name), &[uuid]);
        assert_eq!(map.candidates(&by_line), &[uuid]);
    }

    #[test]
    fn restore_plan_keeps_vector_when_hash_and_provider_model_match() {
        let uuid = Uuid::new_v4();
        let mut node = node(uuid, "/a.rs", "foo", 10);
        node.embeddings.insert(
            EmbeddingField::Content,
            CapturedEmbedding {
                vector: vec![1.0, 2.0],
                hash: "h1".into(),
                provider: "local".into(),
                model: "v1".into(),
            },
        );
        let mut reemitted = HashMap::new();
        let mut fields = HashMap::new();
        fields.insert(EmbeddingField::Content, "h1".to_string());
        reemitted.insert(uuid, fields);

        let plan = MetadataPreserver::plan_restore(&[node], &reemitted, "local", "v1");
        assert!(plan.restored_fields(&uuid).unwrap().contains_key(&EmbeddingField::Content));
    }

    #[test]
    fn restore_plan_drops_vector_when_text_changed() {
        let uuid = Uuid::new_v4();
        let mut node = node(uuid, "/a.rs", "foo", 10);
        node.embeddings.insert(
            EmbeddingField::Content,
            CapturedEmbedding {
                vector: vec![1.0],
                hash: "h1".into(),
                provider: "local".into(),
                model: "v1".into(),
            },
        );
        let mut reemitted = HashMap::new();
        let mut fields = HashMap::new();
        fields.insert(EmbeddingField::Content, "h2".to_string()); // changed
        reemitted.insert(uuid, fields);

        let plan = MetadataPreserver::plan_restore(&[node], &reemitted, "local", "v1");
        assert!(plan.restored_fields(&uuid).is_none());
    }

    #[test]
    fn restore_plan_drops_vector_when_provider_changed() {
        let uuid = Uuid::new_v4();
        let mut node = node(uuid, "/a.rs", "foo", 10);
        node.embeddings.insert(
            EmbeddingField::Content,
            CapturedEmbedding {
                vector: vec![1.0],
                hash: "h1".into(),
                provider: "local".into(),
                model: "v1".into(),
            },
        );
        let mut reemitted = HashMap::new();
        let mut fields = HashMap::new();
        fields.insert(EmbeddingField::Content, "h1".to_string());
        reemitted.insert(uuid, fields);

        let plan = MetadataPreserver::plan_restore(&[node], &reemitted, "openai", "v1");
        assert!(plan.restored_fields(&uuid).is_none());
    }

    #[test]
    fn apply_sets_embedding_hash_for_restored_field_only() {
        let uuid = Uuid::new_v4();
        let mut plan = RestorePlan::default();
        let mut fields = HashMap::new();
        fields.insert(
            EmbeddingField::Name,
            CapturedEmbedding {
                vector: vec![1.0],
                hash: "hn".into(),
                provider: "local".into(),
                model: "v1".into(),
            },
        );
        plan.restore.insert(uuid, fields);

        let mut props = SystemProperties::new(uuid, "proj", crate::model::NodeKind::Scope, 0);
        props.state = NodeState::Parsed;
        MetadataPreserver::apply(&plan, &uuid, &mut props);
        assert!(props.has_embedding(EmbeddingField::Name));
        assert!(!props.has_embedding(EmbeddingField::Content));
    }
}
