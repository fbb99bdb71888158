//! Graph store abstraction (spec.md §6, external interface) plus an
//! in-memory reference implementation.
//!
//! The core only ever calls the operations named in spec.md §6: labelled
//! nodes, typed edges, property maps, `MERGE`-like upserts, `UNWIND`-like
//! batch binding, uniqueness constraints, and a vector-index hook. Any
//! backend satisfying [`GraphStore`] is acceptable; [`InMemoryGraphStore`]
//! is shipped so the crate is testable standalone, grounded on
//! `tonydavis629-canopy`'s `Graph` (a `petgraph::StableDiGraph` wrapper) for
//! the reference-implementation shape — `petgraph` is a dependency the
//! teacher already carries but barely exercises.
use std::collections::{BTreeMap, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use uuid::Uuid;

use crate::error::IngestError;
use crate::model::{EdgeKind, EdgeProperties, EmbeddingField, SystemProperties};

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub uuid: Uuid,
    /// Absolute path of the file this node belongs to (itself, for File
    /// nodes; its containing file, for content nodes). Used by
    /// `nodes_for_file` to support cascade-delete on file removal
    /// (spec.md 4.J step 3a).
    pub file: String,
    pub properties: SystemProperties,
    /// Vector values for each embedded field. Kept alongside rather than
    /// inside `SystemProperties` (which only tracks the field's input hash)
    /// since a real graph backend would store these as a separate indexed
    /// property; the in-memory store does the same for symmetry.
    #[allow(clippy::type_complexity)]
    pub embeddings: BTreeMap<EmbeddingField, Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct GraphEdgeRecord {
    pub kind: EdgeKind,
    pub properties: EdgeProperties,
}

/// A uniqueness constraint over `(label-like key, property)`, created at
/// startup per spec.md 3.4 invariant 5 and spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniquenessConstraint {
    pub label: String,
    pub property: String,
}

/// Abstract graph store contract. Intentionally synchronous-looking at the
/// trait level (matching the "async-await is a scheduling contract, not a
/// language feature" design note in spec.md 9) — async backends wrap these
/// behind their own runtime.
pub trait GraphStore: Send + Sync {
    /// `MERGE`-like upsert: match by `uuid`, create if absent, update
    /// properties on match.
    fn upsert_node(&self, node: GraphNode) -> Result<(), IngestError>;

    /// `UNWIND`-like batch upsert.
    fn upsert_nodes(&self, nodes: Vec<GraphNode>) -> Result<(), IngestError> {
        for node in nodes {
            self.upsert_node(node)?;
        }
        Ok(())
    }

    fn upsert_edge(
        &self,
        from: Uuid,
        to: Uuid,
        kind: EdgeKind,
        properties: EdgeProperties,
    ) -> Result<(), IngestError>;

    fn remove_node(&self, uuid: Uuid) -> Result<(), IngestError>;
    fn remove_edge(&self, from: Uuid, to: Uuid, kind: EdgeKind) -> Result<(), IngestError>;

    fn get_node(&self, uuid: Uuid) -> Option<GraphNode>;
    fn has_edge(&self, from: Uuid, to: Uuid, kind: EdgeKind) -> bool;
    fn edges_from(&self, uuid: Uuid) -> Vec<(Uuid, EdgeKind, EdgeProperties)>;
    fn edges_to(&self, uuid: Uuid) -> Vec<(Uuid, EdgeKind, EdgeProperties)>;

    fn nodes_for_file(&self, project_id: &str, file: &str) -> Vec<Uuid>;

    /// Enumerates nodes of a given kind for a project. Used by pending-import
    /// resolution (spec.md 8, property 6) to sweep `PendingImport`
    /// placeholders without the orchestrator needing its own side index.
    fn nodes_by_kind(&self, project_id: &str, kind: crate::model::NodeKind) -> Vec<Uuid>;

    fn create_uniqueness_constraint(&self, constraint: UniquenessConstraint) -> Result<(), IngestError>;

    /// Approximate-nearest-neighbor lookup hook per `(label, embedding_field)`.
    /// A reference/in-memory store cannot do real ANN search; it returns an
    /// empty result set rather than fabricating one, which is a faithful
    /// "not core" stand-in per spec.md §6.
    fn vector_search(&self, _label: &str, _embedding_field: &str, _top_k: usize) -> Vec<Uuid> {
        Vec::new()
    }

    fn node_count(&self) -> usize;
    fn edge_count(&self) -> usize;
}

struct Inner {
    graph: StableDiGraph<GraphNode, GraphEdgeRecord>,
    index_by_uuid: HashMap<Uuid, NodeIndex>,
    constraints: Vec<UniquenessConstraint>,
}

/// In-memory reference `GraphStore`. Not persistent; suitable for tests and
/// for embedding ingestion in-process ahead of a real backend.
pub struct InMemoryGraphStore {
    inner: parking_lot::RwLock<Inner>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        InMemoryGraphStore {
            inner: parking_lot::RwLock::new(Inner {
                graph: StableDiGraph::new(),
                index_by_uuid: HashMap::new(),
                constraints: Vec::new(),
            }),
        }
    }
}

impl GraphStore for InMemoryGraphStore {
    fn upsert_node(&self, node: GraphNode) -> Result<(), IngestError> {
        let mut inner = self.inner.write();
        if let Some(&idx) = inner.index_by_uuid.get(&node.uuid) {
            inner.graph[idx] = node;
        } else {
            let uuid = node.uuid;
            let idx = inner.graph.add_node(node);
            inner.index_by_uuid.insert(uuid, idx);
        }
        Ok(())
    }

    fn upsert_edge(
        &self,
        from: Uuid,
        to: Uuid,
        kind: EdgeKind,
        properties: EdgeProperties,
    ) -> Result<(), IngestError> {
        let mut inner = self.inner.write();
        let from_idx = *inner
            .index_by_uuid
            .get(&from)
            .ok_or_else(|| IngestError::NotFound(format!("edge source {from} missing")))?;
        let to_idx = *inner
            .index_by_uuid
            .get(&to)
            .ok_or_else(|| IngestError::NotFound(format!("edge target {to} missing")))?;

        // MERGE semantics: update properties if the (from, to, kind) triple
        // already exists rather than adding a parallel edge (spec.md 4.G
        // invariant: each CONSUMES triple is unique).
        let existing = inner
            .graph
            .edges(from_idx)
            .find(|e| e.target() == to_idx && e.weight().kind == kind)
            .map(|e| e.id());
        if let Some(edge_id) = existing {
            inner.graph[edge_id].properties = properties;
        } else {
            inner
                .graph
                .add_edge(from_idx, to_idx, GraphEdgeRecord { kind, properties });
        }
        Ok(())
    }

    fn remove_node(&self, uuid: Uuid) -> Result<(), IngestError> {
        let mut inner = self.inner.write();
        if let Some(idx) = inner.index_by_uuid.remove(&uuid) {
            inner.graph.remove_node(idx);
        }
        Ok(())
    }

    fn remove_edge(&self, from: Uuid, to: Uuid, kind: EdgeKind) -> Result<(), IngestError> {
        let mut inner = self.inner.write();
        let (Some(&from_idx), Some(&to_idx)) = (
            inner.index_by_uuid.get(&from),
            inner.index_by_uuid.get(&to),
        ) else {
            return Ok(());
        };
        let edge_id = inner
            .graph
            .edges(from_idx)
            .find(|e| e.target() == to_idx && e.weight().kind == kind)
            .map(|e| e.id());
        if let Some(edge_id) = edge_id {
            inner.graph.remove_edge(edge_id);
        }
        Ok(())
    }

    fn get_node(&self, uuid: Uuid) -> Option<GraphNode> {
        let inner = self.inner.read();
        inner
            .index_by_uuid
            .get(&uuid)
            .and_then(|&idx| inner.graph.node_weight(idx))
            .cloned()
    }

    fn has_edge(&self, from: Uuid, to: Uuid, kind: EdgeKind) -> bool {
        let inner = self.inner.read();
        let (Some(&from_idx), Some(&to_idx)) = (
            inner.index_by_uuid.get(&from),
            inner.index_by_uuid.get(&to),
        ) else {
            return false;
        };
        inner
            .graph
            .edges(from_idx)
            .any(|e| e.target() == to_idx && e.weight().kind == kind)
    }

    fn edges_from(&self, uuid: Uuid) -> Vec<(Uuid, EdgeKind, EdgeProperties)> {
        let inner = self.inner.read();
        let Some(&idx) = inner.index_by_uuid.get(&uuid) else {
            return Vec::new();
        };
        inner
            .graph
            .edges(idx)
            .filter_map(|e| {
                inner
                    .graph
                    .node_weight(e.target())
                    .map(|n| (n.uuid, e.weight().kind, e.weight().properties.clone()))
            })
            .collect()
    }

    fn edges_to(&self, uuid: Uuid) -> Vec<(Uuid, EdgeKind, EdgeProperties)> {
        let inner = self.inner.read();
        let Some(&idx) = inner.index_by_uuid.get(&uuid) else {
            return Vec::new();
        };
        inner
            .graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .filter_map(|e| {
                inner
                    .graph
                    .node_weight(e.source())
                    .map(|n| (n.uuid, e.weight().kind, e.weight().properties.clone()))
            })
            .collect()
    }

    fn nodes_for_file(&self, project_id: &str, file: &str) -> Vec<Uuid> {
        let inner = self.inner.read();
        inner
            .graph
            .node_weights()
            .filter(|n| n.properties.project_id == project_id && n.file == file)
            .map(|n| n.uuid)
            .collect()
    }

    fn nodes_by_kind(&self, project_id: &str, kind: crate::model::NodeKind) -> Vec<Uuid> {
        let inner = self.inner.read();
        inner
            .graph
            .node_weights()
            .filter(|n| n.properties.project_id == project_id && n.properties.kind == kind)
            .map(|n| n.uuid)
            .collect()
    }

    fn create_uniqueness_constraint(&self, constraint: UniquenessConstraint) -> Result<(), IngestError> {
        let mut inner = self.inner.write();
        if !inner.constraints.contains(&constraint) {
            inner.constraints.push(constraint);
        }
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.inner.read().graph.node_count()
    }

    fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn node(uuid: Uuid, project: &str) -> GraphNode {
        GraphNode {
            uuid,
            file: "/a.rs".to_string(),
            properties: SystemProperties::new(uuid, project, NodeKind::Scope, 0),
            embeddings: BTreeMap::new(),
        }
    }

    #[test]
    fn nodes_for_file_finds_members_by_path_and_project() {
        let store = InMemoryGraphStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_node(node(a, "p")).unwrap();
        store
            .upsert_node(GraphNode {
                uuid: b,
                file: "/b.rs".to_string(),
                properties: SystemProperties::new(b, "p", NodeKind::Scope, 0),
                embeddings: BTreeMap::new(),
            })
            .unwrap();
        let found = store.nodes_for_file("p", "/a.rs");
        assert_eq!(found, vec![a]);
    }

    #[test]
    fn upsert_is_idempotent_by_uuid() {
        let store = InMemoryGraphStore::new();
        let uuid = Uuid::new_v4();
        store.upsert_node(node(uuid, "p")).unwrap();
        store.upsert_node(node(uuid, "p")).unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn upsert_edge_merges_rather_than_duplicating() {
        let store = InMemoryGraphStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_node(node(a, "p")).unwrap();
        store.upsert_node(node(b, "p")).unwrap();
        store
            .upsert_edge(a, b, EdgeKind::Consumes, EdgeProperties::default())
            .unwrap();
        store
            .upsert_edge(
                a,
                b,
                EdgeKind::Consumes,
                EdgeProperties {
                    symbols: vec!["foo".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.edge_count(), 1);
        assert!(store.has_edge(a, b, EdgeKind::Consumes));
        let edges = store.edges_from(a);
        assert_eq!(edges[0].2.symbols, vec!["foo".to_string()]);
    }

    #[test]
    fn remove_node_drops_its_edges() {
        let store = InMemoryGraphStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_node(node(a, "p")).unwrap();
        store.upsert_node(node(b, "p")).unwrap();
        store
            .upsert_edge(a, b, EdgeKind::Consumes, EdgeProperties::default())
            .unwrap();
        store.remove_node(a).unwrap();
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn edges_to_reports_incoming() {
        let store = InMemoryGraphStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_node(node(a, "p")).unwrap();
        store.upsert_node(node(b, "p")).unwrap();
        store
            .upsert_edge(a, b, EdgeKind::Consumes, EdgeProperties::default())
            .unwrap();
        let incoming = store.edges_to(b);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].0, a);
    }
}
