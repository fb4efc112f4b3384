//! End-to-end ingest tests
//!
//! These tests validate the full pipeline against in-memory collaborators:
//! - Equivalent results across association methods
//! - Batch metadata written once for the whole graph
//! - Counter accounting
//! - Structure maps, OCR text and legacy identifiers

mod common;

use std::sync::Arc;

use common::{fixture_path, ingest_fixture, Harness, RecordingActor};
use folio_ingest::descriptor::FileRole;
use folio_ingest::graph::{ResourceState, SequentialMinter, Visibility};
use folio_ingest::store::ObjectStore;
use folio_ingest::{AssociationMethod, IngestPipeline};

const METHODS: [AssociationMethod; 3] = [
    AssociationMethod::Individual,
    AssociationMethod::Batch,
    AssociationMethod::None,
];

// ============================================================================
// Strategy equivalence
// ============================================================================

#[tokio::test]
async fn test_methods_produce_equivalent_resources() {
    let mut shapes = Vec::new();

    for method in METHODS {
        let h = Harness::new();
        let run = ingest_fixture(h.gateway.clone(), method, "single_volume.yml", None).await;
        let report = run.report.unwrap();
        assert_eq!(report.method, method);

        let resource = h.resource(&report.resource_ids[0]).await;
        shapes.push((
            resource.title.clone(),
            resource.viewing_direction,
            resource.state,
            resource.visibility,
            resource.member_ids.len() + resource.related_object_ids.len(),
        ));

        if let Some(stats) = run.worker {
            assert_eq!(stats.failed, 0);
        }
    }

    assert!(shapes.iter().all(|s| s == &shapes[0]), "shapes differ: {:?}", shapes);
    assert_eq!(shapes[0].0, vec!["Fontane di Roma"]);
    assert_eq!(shapes[0].2, Some(ResourceState::Complete));
    assert_eq!(shapes[0].3, Visibility::Open);
    assert_eq!(shapes[0].4, 2);
}

#[tokio::test]
async fn test_content_stored_for_every_method() {
    for method in METHODS {
        let h = Harness::new();
        let report = ingest_fixture(h.gateway.clone(), method, "single_volume.yml", None)
            .await
            .report
            .unwrap();

        let resource = h.resource(&report.resource_ids[0]).await;
        let page = h.unit(&resource.member_ids[0]).await;
        assert!(page.files[0].is_characterized(), "{} left content uncharacterized", method);

        let stored = h.store.get_content(&page.files[0].key).await.unwrap();
        assert_eq!(stored, std::fs::read(fixture_path("files/color.tif")).unwrap());
    }
}

#[tokio::test]
async fn test_batch_writes_graph_metadata_once() {
    let h = Harness::new();
    let actor = Arc::new(RecordingActor::new(h.gateway.clone()));
    let pipeline = IngestPipeline::builder(h.gateway.clone())
        .method(AssociationMethod::Batch)
        .actor(actor.clone())
        .build()
        .unwrap();

    pipeline
        .ingest_path(fixture_path("multi_volume.yml"))
        .await
        .unwrap();

    assert_eq!(actor.metadata_targets(), vec![None]);
    assert_eq!(actor.attached(), 3);
}

#[tokio::test]
async fn test_individual_writes_metadata_per_entity() {
    let h = Harness::new();
    let actor = Arc::new(RecordingActor::new(h.gateway.clone()));
    let pipeline = IngestPipeline::builder(h.gateway.clone())
        .actor(actor.clone())
        .minter(Arc::new(SequentialMinter::new()))
        .build()
        .unwrap();

    let report = pipeline
        .ingest_path(fixture_path("single_volume.yml"))
        .await
        .unwrap();

    let targets = actor.metadata_targets();
    // two units, then their resource
    assert_eq!(targets.len(), 3);
    assert!(targets.iter().all(Option::is_some));
    assert_eq!(targets[2].as_ref(), Some(&report.resource_ids[0]));
}

// ============================================================================
// Counter
// ============================================================================

#[tokio::test]
async fn test_counter_matches_file_units() {
    for method in METHODS {
        let h = Harness::new();
        let report = ingest_fixture(h.gateway.clone(), method, "multi_volume.yml", None)
            .await
            .report
            .unwrap();

        assert_eq!(report.file_units, 3);
        assert_eq!(report.ingested, 3, "{} miscounted", method);
    }
}

// ============================================================================
// Descriptor features
// ============================================================================

#[tokio::test]
async fn test_right_to_left_example() {
    let h = Harness::new();
    let report = ingest_fixture(h.gateway.clone(), AssociationMethod::Individual, "rtl.yml", None)
        .await
        .report
        .unwrap();

    assert_eq!(report.resource_ids.len(), 1);
    let resource = h.resource(&report.resource_ids[0]).await;
    assert_eq!(resource.title, vec!["Sample Title"]);
    assert_eq!(resource.viewing_direction.as_str(), "right-to-left");
    assert_eq!(resource.state.map(|s| s.as_str()), Some("complete"));
    assert_eq!(resource.member_ids.len(), 1);

    let unit = h.unit(&resource.member_ids[0]).await;
    assert_eq!(unit.files[0].mime_type, "image/tiff");
}

#[tokio::test]
async fn test_structure_map_source_is_related_object() {
    let h = Harness::new();
    let report = ingest_fixture(h.gateway.clone(), AssociationMethod::Batch, "single_volume.yml", None)
        .await
        .report
        .unwrap();
    let resource = h.resource(&report.resource_ids[0]).await;

    assert_eq!(resource.member_ids.len(), 1);
    assert_eq!(resource.related_object_ids.len(), 1);
    assert_eq!(resource.thumbnail_id.as_ref(), Some(&resource.member_ids[0]));

    let mets = h.unit(&resource.related_object_ids[0]).await;
    assert_eq!(mets.title, vec!["METS XML"]);
    assert_eq!(mets.role, FileRole::StructureMapSource);
    let bytes = h.store.get_content(&mets.files[0].key).await.unwrap();
    assert_eq!(bytes, std::fs::read(fixture_path("files/mets.xml")).unwrap());
    assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n<mets:mets"));

    let page = h.unit(&resource.member_ids[0]).await;
    assert_eq!(page.title, vec!["leaf 1. recto"]);
}

#[tokio::test]
async fn test_legacy_identifier_and_collections() {
    let h = Harness::new();
    let report = ingest_fixture(h.gateway.clone(), AssociationMethod::Individual, "single_volume.yml", None)
        .await
        .report
        .unwrap();
    let resource = h.resource(&report.resource_ids[0]).await;

    assert_eq!(resource.replaces.as_deref(), Some("pudl0001/4609321/331"));
    assert_eq!(resource.member_of_collections.len(), 1);
    assert_eq!(resource.member_of_collections[0].slug, "rare-books");

    let indexed = h.gateway.indexed(&resource.id).await.unwrap().unwrap();
    assert_eq!(indexed.collections, vec!["rare-books"]);
    assert_eq!(indexed.state.as_deref(), Some("complete"));
}

#[tokio::test]
async fn test_ocr_text_joins_page_unit() {
    let h = Harness::new();
    let report = ingest_fixture(h.gateway.clone(), AssociationMethod::Individual, "ocr.yml", None)
        .await
        .report
        .unwrap();

    assert_eq!(report.file_units, 1);
    let resource = h.resource(&report.resource_ids[0]).await;
    let page = h.unit(&resource.member_ids[0]).await;

    let mimes: Vec<&str> = page.files.iter().map(|f| f.mime_type.as_str()).collect();
    assert_eq!(mimes, vec!["image/tiff", "text/plain"]);
    assert!(page.files.iter().all(|f| f.is_characterized()));
}
