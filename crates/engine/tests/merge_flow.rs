use fieldscope_engine::{ContextRegistry, FieldCatalog, MergeEngine};
use fieldscope_protocol::{CatalogEntry, ContextDraft, Observation, PageRequest, SearchCriteria};
use fieldscope_store::MemoryStore;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

fn draft(id: &str, required: &[&str], optional: &[&str]) -> ContextDraft {
    ContextDraft {
        context_id: id.to_string(),
        display_name: None,
        description: None,
        required_metadata: required.iter().map(|s| s.to_string()).collect(),
        optional_metadata: optional.iter().map(|s| s.to_string()).collect(),
        metadata_rules: BTreeMap::new(),
        active: true,
    }
}

fn obs(path: &str, metadata: &[(&str, &str)], occurs: u32) -> Observation {
    Observation {
        field_path: path.to_string(),
        metadata: metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        occurs,
        has_null: false,
        has_empty: false,
    }
}

fn dda_meta() -> Vec<(&'static str, &'static str)> {
    vec![
        ("productcode", "DDA"),
        ("productsubcode", "4S"),
        ("action", "Fulfillment"),
    ]
}

async fn deposits_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    ContextRegistry::new(store.clone())
        .create(draft(
            "deposits",
            &["productcode", "productsubcode", "action"],
            &["channel"],
        ))
        .await
        .expect("create context");
    store
}

async fn all_entries(store: Arc<MemoryStore>) -> Vec<CatalogEntry> {
    FieldCatalog::new(store)
        .find(&SearchCriteria::default(), &PageRequest { page: 0, size: 100 })
        .await
        .expect("find")
        .items
}

async fn entry_by_path(store: Arc<MemoryStore>, path: &str) -> CatalogEntry {
    all_entries(store)
        .await
        .into_iter()
        .find(|entry| entry.field_path == path)
        .unwrap_or_else(|| panic!("no entry for {}", path))
}

#[tokio::test]
async fn first_observation_creates_entry_with_normalized_path() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    let stats = engine
        .merge(
            "deposits",
            &[obs("/Ceremony/FeeCode", &dda_meta(), 1)],
        )
        .await
        .expect("merge");
    assert_eq!(stats.observations, 1);
    assert_eq!(stats.entries_created, 1);
    assert_eq!(stats.entries_updated, 0);

    let entry = entry_by_path(store, "/ceremony/feecode").await;
    assert_eq!(entry.context_id, "deposits");
    assert_eq!(entry.min_occurs, 1);
    assert_eq!(entry.max_occurs, 1);
    assert!(!entry.allows_null);
    assert!(!entry.allows_empty);
    assert_eq!(entry.casing_counts.get("/Ceremony/FeeCode"), Some(&1));
    assert_eq!(
        entry.required_metadata.get("productcode"),
        Some(&"DDA".to_string())
    );
}

#[tokio::test]
async fn statistics_are_invariant_under_batch_order() {
    for counts in [[5, 2, 8], [8, 5, 2], [2, 8, 5]] {
        let store = deposits_store().await;
        let engine = MergeEngine::new(store.clone());

        let batch: Vec<Observation> = counts
            .iter()
            .map(|count| obs("/Ceremony/FeeCode", &dda_meta(), *count))
            .collect();
        let stats = engine.merge("deposits", &batch).await.expect("merge");
        assert_eq!(stats.entries_created, 1);

        let entry = entry_by_path(store, "/ceremony/feecode").await;
        assert_eq!(entry.min_occurs, 2, "order {:?}", counts);
        assert_eq!(entry.max_occurs, 8, "order {:?}", counts);
        assert_eq!(entry.casing_counts.get("/Ceremony/FeeCode"), Some(&3));
    }
}

#[tokio::test]
async fn identity_is_shared_across_casing_and_optional_metadata() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    let mut with_channel = dda_meta();
    with_channel.push(("channel", "web"));
    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("first merge");
    let stats = engine
        .merge("deposits", &[obs("/CEREMONY/FeeCode", &with_channel, 4)])
        .await
        .expect("second merge");
    assert_eq!(stats.entries_created, 0);
    assert_eq!(stats.entries_updated, 1);

    let entries = all_entries(store).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.min_occurs, 1);
    assert_eq!(entry.max_occurs, 4);
    assert_eq!(entry.casing_counts.len(), 2);
    assert_eq!(entry.casing_counts.get("/CEREMONY/FeeCode"), Some(&1));
}

#[tokio::test]
async fn optional_values_accumulate_without_duplicates() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    for channel in ["web", "mobile", "web"] {
        let mut metadata = dda_meta();
        metadata.push(("channel", channel));
        engine
            .merge("deposits", &[obs("/Ceremony/FeeCode", &metadata, 1)])
            .await
            .expect("merge");
    }

    let entry = entry_by_path(store, "/ceremony/feecode").await;
    let channels = entry.optional_metadata.get("channel").expect("channel set");
    assert_eq!(channels.len(), 2);
    assert!(channels.contains("web"));
    assert!(channels.contains("mobile"));
}

#[tokio::test]
async fn null_and_empty_flags_only_ever_turn_on() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    let mut first = obs("/Ceremony/FeeCode", &dda_meta(), 1);
    first.has_null = true;
    engine.merge("deposits", &[first]).await.expect("merge");
    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("merge");

    let entry = entry_by_path(store, "/ceremony/feecode").await;
    assert!(entry.allows_null);
    assert!(!entry.allows_empty);
}

#[tokio::test]
async fn homogeneous_batch_marks_absent_fields_optional() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("first merge");
    let stats = engine
        .merge(
            "deposits",
            &[obs("/Ceremony/DifferentField", &dda_meta(), 1)],
        )
        .await
        .expect("second merge");
    assert_eq!(stats.paths_reset, 1);

    let fee = entry_by_path(store.clone(), "/ceremony/feecode").await;
    assert_eq!(fee.min_occurs, 0);
    assert_eq!(fee.max_occurs, 1);
    let different = entry_by_path(store, "/ceremony/differentfield").await;
    assert_eq!(different.min_occurs, 1);
}

#[tokio::test]
async fn mixed_batch_skips_disappearance_cleanup() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("first merge");

    let sav_meta = vec![
        ("productcode", "SAV"),
        ("productsubcode", "9Z"),
        ("action", "Fulfillment"),
    ];
    let stats = engine
        .merge(
            "deposits",
            &[
                obs("/Ceremony/DifferentField", &dda_meta(), 1),
                obs("/Ceremony/OtherField", &sav_meta, 1),
            ],
        )
        .await
        .expect("mixed merge");
    assert_eq!(stats.paths_reset, 0);

    let fee = entry_by_path(store, "/ceremony/feecode").await;
    assert_eq!(fee.min_occurs, 1, "mixed batch must not infer absence");
}

#[tokio::test]
async fn cleanup_does_not_cross_schema_variants() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    let sav_meta = vec![
        ("productcode", "SAV"),
        ("productsubcode", "9Z"),
        ("action", "Fulfillment"),
    ];
    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("dda merge");
    engine
        .merge("deposits", &[obs("/Ceremony/OtherField", &sav_meta, 1)])
        .await
        .expect("sav merge");

    // The SAV batch is homogeneous, but /ceremony/feecode belongs to the DDA
    // variant and must keep its statistics.
    let fee = entry_by_path(store, "/ceremony/feecode").await;
    assert_eq!(fee.min_occurs, 1);
}

#[tokio::test]
async fn reset_entries_stay_optional_when_the_field_returns() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 2)])
        .await
        .expect("first merge");
    engine
        .merge(
            "deposits",
            &[obs("/Ceremony/DifferentField", &dda_meta(), 1)],
        )
        .await
        .expect("cleanup merge");
    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 3)])
        .await
        .expect("return merge");

    let fee = entry_by_path(store, "/ceremony/feecode").await;
    assert_eq!(fee.min_occurs, 0);
    assert_eq!(fee.max_occurs, 3);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    let stats = engine.merge("deposits", &[]).await.expect("empty merge");
    assert_eq!(stats, fieldscope_engine::MergeStats::default());
    assert!(all_entries(store).await.is_empty());
}

#[tokio::test]
async fn observation_timestamps_track_first_and_last_sightings() {
    let store = deposits_store().await;
    let engine = MergeEngine::new(store.clone());

    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 1)])
        .await
        .expect("first merge");
    let created = entry_by_path(store.clone(), "/ceremony/feecode").await;

    engine
        .merge("deposits", &[obs("/Ceremony/FeeCode", &dda_meta(), 2)])
        .await
        .expect("second merge");
    let updated = entry_by_path(store, "/ceremony/feecode").await;

    assert_eq!(updated.first_observed_at, created.first_observed_at);
    assert!(updated.last_observed_at >= created.last_observed_at);
}
