//! File/node state machine (component 4.E). Pure logic; persistence is
//! delegated to `store::FileStateStore`.
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Mentioned,
    Discovered,
    Parsing,
    Parsed,
    Relations,
    Linked,
    Embedding,
    Embedded,
    Error,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Mentioned => "mentioned",
            NodeState::Discovered => "discovered",
            NodeState::Parsing => "parsing",
            NodeState::Parsed => "parsed",
            NodeState::Relations => "relations",
            NodeState::Linked => "linked",
            NodeState::Embedding => "embedding",
            NodeState::Embedded => "embedded",
            NodeState::Error => "error",
        }
    }
}

/// Validates `from -> to` against the transition table in spec.md 4.E.
/// `error(*) -> parsing` is the explicit retry path; `{parsed, relations,
/// linked, embedding, embedded, error} -> discovered` models a file-change
/// detected mid-lifecycle. Any other pair is `InvalidTransition`.
pub fn validate_transition(from: NodeState, to: NodeState) -> Result<(), IngestError> {
    use NodeState::*;
    let legal = matches!(
        (from, to),
        (Mentioned, Discovered)
            | (Discovered, Parsing)
            | (Parsing, Parsed)
            | (Parsing, Error)
            | (Parsed, Relations)
            | (Parsed, Linked)
            | (Relations, Linked)
            | (Relations, Error)
            | (Linked, Embedding)
            | (Linked, Embedded)
            | (Embedding, Embedded)
            | (Embedding, Error)
            | (Error, Parsing)
    ) || (to == Discovered
        && matches!(from, Parsed | Relations | Linked | Embedding | Embedded | Error));

    if legal {
        Ok(())
    } else {
        Err(IngestError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// A file/node is retryable once in `error` with fewer than `max_retries`
/// attempts already made; `store::FileStateStore::retryable_files` uses
/// this as a filter predicate.
pub fn is_retryable(state: NodeState, retry_count: u32, max_retries: u32) -> bool {
    state == NodeState::Error && retry_count < max_retries
}
