//! Exercises embedding preservation (property 3) and scenario S7 (a
//! provider/model change forces full regeneration even when no text
//! changed) against the public metadata-preservation and embedding-
//! coordinator APIs, independent of the orchestrator wiring that calls them.

use std::collections::HashMap;

use ingestor_core::embedding::{group_by_node, EmbeddingCoordinator, EmbeddingProvider, EmbeddingRequest};
use ingestor_core::error::IngestError;
use ingestor_core::identity::content_hash_hex;
use ingestor_core::metadata::{CapturedEmbedding, CapturedNode, MetadataPreserver};
use ingestor_core::model::{EmbeddingField, NodeKind, SystemProperties};
use ingestor_core::testing::DeterministicEmbedder;
use uuid::Uuid;

fn captured_with_embeddings(uuid: Uuid, file: &str, name: &str, fields: &[(EmbeddingField, &str, &str, &str)]) -> CapturedNode {
    let mut embeddings = HashMap::new();
    for (field, hash, provider, model) in fields {
        embeddings.insert(
            *field,
            CapturedEmbedding {
                vector: vec![1.0, 2.0],
                hash: hash.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
            },
        );
    }
    CapturedNode {
        uuid,
        label: "Scope".into(),
        file: file.into(),
        name: Some(name.into()),
        start_line: Some(1),
        end_line: Some(5),
        content_hash: Some("irrelevant".into()),
        embeddings,
    }
}

#[test]
fn unrelated_reparse_with_identical_text_preserves_both_fields() {
    let uuid = Uuid::new_v4();
    let name_hash = content_hash_hex(b"greet");
    let body_hash = content_hash_hex(b"hello\n");
    let captured = captured_with_embeddings(
        uuid,
        "/a.demo",
        "greet",
        &[
            (EmbeddingField::Name, &name_hash, "local", "v1"),
            (EmbeddingField::Content, &body_hash, "local", "v1"),
        ],
    );

    // The fresh parse re-emits the same node under the same uuid with
    // identical text for both fields -- the situation unrelated edits
    // elsewhere in the file produce.
    let mut reemitted = HashMap::new();
    let mut fresh_hashes = HashMap::new();
    fresh_hashes.insert(EmbeddingField::Name, name_hash.clone());
    fresh_hashes.insert(EmbeddingField::Content, body_hash.clone());
    reemitted.insert(uuid, fresh_hashes);

    let plan = MetadataPreserver::plan_restore(&[captured], &reemitted, "local", "v1");
    let mut props = SystemProperties::new(uuid, "proj", NodeKind::Scope, 0);
    MetadataPreserver::apply(&plan, &uuid, &mut props);

    assert!(props.has_embedding(EmbeddingField::Name));
    assert!(props.has_embedding(EmbeddingField::Content));
}

#[test]
fn edit_inside_one_fields_text_regenerates_only_that_field() {
    let uuid = Uuid::new_v4();
    let name_hash = content_hash_hex(b"greet");
    let old_body_hash = content_hash_hex(b"hello\n");
    let new_body_hash = content_hash_hex(b"hello world\n");
    assert_ne!(old_body_hash, new_body_hash);

    let captured = captured_with_embeddings(
        uuid,
        "/a.demo",
        "greet",
        &[
            (EmbeddingField::Name, &name_hash, "local", "v1"),
            (EmbeddingField::Content, &old_body_hash, "local", "v1"),
        ],
    );

    let mut reemitted = HashMap::new();
    let mut fresh_hashes = HashMap::new();
    fresh_hashes.insert(EmbeddingField::Name, name_hash.clone()); // name text unchanged
    fresh_hashes.insert(EmbeddingField::Content, new_body_hash); // body text changed
    reemitted.insert(uuid, fresh_hashes);

    let plan = MetadataPreserver::plan_restore(&[captured], &reemitted, "local", "v1");
    let mut props = SystemProperties::new(uuid, "proj", NodeKind::Scope, 0);
    MetadataPreserver::apply(&plan, &uuid, &mut props);

    assert!(props.has_embedding(EmbeddingField::Name), "name embedding should survive the edit");
    assert!(
        !props.has_embedding(EmbeddingField::Content),
        "content embedding should be dropped so the coordinator regenerates it"
    );
}

#[test]
fn scenario_s7_provider_change_forces_regeneration_of_every_field_despite_identical_text() {
    let uuid = Uuid::new_v4();
    let name_hash = content_hash_hex(b"greet");
    let body_hash = content_hash_hex(b"hello\n");
    let captured = captured_with_embeddings(
        uuid,
        "/a.demo",
        "greet",
        &[
            (EmbeddingField::Name, &name_hash, "local", "default"),
            (EmbeddingField::Content, &body_hash, "local", "default"),
        ],
    );

    let mut reemitted = HashMap::new();
    let mut fresh_hashes = HashMap::new();
    fresh_hashes.insert(EmbeddingField::Name, name_hash.clone());
    fresh_hashes.insert(EmbeddingField::Content, body_hash.clone());
    reemitted.insert(uuid, fresh_hashes);

    // Same provider, new model -- text is byte-identical but the vector
    // space it would land in has changed, so nothing is restorable.
    let plan = MetadataPreserver::plan_restore(&[captured.clone()], &reemitted, "local", "a-better-model");
    assert!(plan.restored_fields(&uuid).is_none());

    // And a provider swap behaves the same way even if the model name happens to match.
    let plan_provider_swap = MetadataPreserver::plan_restore(&[captured], &reemitted, "openai", "default");
    assert!(plan_provider_swap.restored_fields(&uuid).is_none());
}

#[derive(Default)]
struct RecordingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }
    fn model(&self) -> &str {
        "v1"
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
    }
}

#[tokio::test]
async fn fields_dropped_by_the_restore_plan_are_exactly_the_ones_the_coordinator_regenerates() {
    // Mirrors what the orchestrator does: only the fields plan_restore
    // didn't keep are turned into embed requests in the first place.
    let uuid = Uuid::new_v4();
    let name_text = "greet".to_string();
    let body_text = "hello world".to_string();

    let requests = vec![EmbeddingRequest {
        uuid,
        field: EmbeddingField::Content,
        text: body_text.clone(),
    }];

    let coordinator = EmbeddingCoordinator::new(RecordingProvider);
    let results = coordinator.embed_all(requests).await;
    let grouped = group_by_node(results);

    let fields = grouped.get(&uuid).expect("content field should have been embedded");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].0, EmbeddingField::Content);
    assert!(fields[0].1.is_ok());
    assert_eq!(coordinator.stats().generated, 1);

    // The name field was restored rather than embedded, so it never shows up here.
    let _ = name_text;
}

#[tokio::test]
async fn deterministic_embedder_produces_the_same_vector_for_the_same_text_across_runs() {
    let embedder = DeterministicEmbedder::default();
    let first = embedder.embed_batch(&["hello".to_string()]).await.unwrap();
    let second = embedder.embed_batch(&["hello".to_string()]).await.unwrap();
    assert_eq!(first, second, "identical text must hash to an identical vector for restore comparisons to be meaningful");
}
