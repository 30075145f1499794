//! Ingestion lifecycle journeys: distillation, idempotent replay,
//! episode consolidation, promotion validation, and supersession.

use memlayer_e2e_tests::harness::{scope, TestDb};

use memlayer_core::{EpisodePayload, EventPayload, View};

#[test]
fn distilled_event_is_searchable_at_half_confidence() {
    let db = TestDb::new();
    let payload = EventPayload::from_content("System crash due to memory leak");
    let outcome = db.engine.upsert_event(&scope(), &payload, "evt-1", true).unwrap();
    let l1_id = outcome.l1_id.expect("distillation should create an observation");

    let hits = db
        .engine
        .search(&scope(), "memory leak", View::Detail, 1000, 8, None)
        .unwrap();
    assert!(!hits.items.is_empty());

    let item = hits.items.iter().find(|i| i.id == l1_id).unwrap();
    assert_eq!(item.memory_type, "Observation");
    assert_eq!(item.confidence, Some(0.5));
}

#[test]
fn replayed_upsert_converges_to_first_result() {
    let db = TestDb::new();
    let payload = EventPayload::from_content("duplicate delivery");

    let first = db.engine.upsert_event(&scope(), &payload, "k1", false).unwrap();
    let second = db.engine.upsert_event(&scope(), &payload, "k1", false).unwrap();
    assert_eq!(first.id, second.id);

    // Replay with a different payload still returns the recorded result
    let other = EventPayload::from_content("entirely different content");
    let third = db.engine.upsert_event(&scope(), &other, "k1", false).unwrap();
    assert_eq!(first.id, third.id);
}

#[test]
fn promotion_without_claims_is_rejected_with_code() {
    let db = TestDb::new();
    let draft = memlayer_core::L2Draft {
        l2_type: "VerifiedFact".to_string(),
        title: "unsupported".to_string(),
        summary: "no claims attached".to_string(),
        tags: vec![],
        entities: vec![],
        claims: vec![],
        applicability: serde_json::Map::new(),
        embedding: None,
    };
    let artifact = memlayer_core::ArtifactRef {
        memory_id: "placeholder".to_string(),
        layer: "L2".to_string(),
        kind: "file".to_string(),
        locator: "/tmp/none".to_string(),
        hash: None,
        classification: memlayer_core::Classification::Internal,
        snippet_policy: memlayer_core::SnippetPolicy::Forbidden,
        created_at: None,
    };

    let err = db
        .engine
        .promote_to_l2(&scope(), &draft, &artifact, "k1")
        .unwrap_err();
    assert_eq!(err.error_code(), Some("PROMOTION_VALIDATION_FAILED"));
    assert_eq!(err.to_string(), "No claims provided");
}

#[test]
fn episode_commit_merges_within_a_session() {
    let db = TestDb::new();
    let mut session_scope = scope();
    session_scope.session_id = Some("s-42".to_string());

    let payload = EpisodePayload {
        title: "Morning debugging".to_string(),
        summary: "Chased a race in the scheduler".to_string(),
        tags: vec!["race".to_string()],
        entities: vec![],
        claims: vec![],
        applicability: serde_json::Map::new(),
        embedding: None,
    };

    let first = db.engine.commit_episode(&session_scope, &payload, "k1").unwrap();
    assert_eq!(first.action, "created");

    let updated = EpisodePayload {
        title: "Morning debugging, resolved".to_string(),
        summary: "The race was in the tick handler".to_string(),
        ..payload
    };
    let second = db.engine.commit_episode(&session_scope, &updated, "k2").unwrap();
    assert_eq!(second.action, "updated");
    assert_eq!(second.id, first.id);

    // The merged episode is findable under its latest title
    let hits = db
        .engine
        .search(&session_scope, "tick handler", View::Index, 1000, 8, None)
        .unwrap();
    assert!(hits.items.iter().any(|i| i.id == first.id));
}

#[test]
fn supersession_chain_links_new_node_to_old() {
    let db = TestDb::new();
    let old = db.seed_fact(&scope(), "timeout is 30s", "/tmp/none-a", "k1");
    let new = db.seed_fact(&scope(), "timeout is 60s", "/tmp/none-b", "k2");

    let outcome = db
        .engine
        .deprecate(&scope(), &old, "superseded by new measurement", Some(&new), None)
        .unwrap();
    assert_eq!(outcome.layer, "L2");

    // The deprecated node drops out of status-filtered search
    let filters = memlayer_core::SearchFilters {
        status: Some("active".to_string()),
        ..Default::default()
    };
    let hits = db
        .engine
        .search(&scope(), "timeout", View::Detail, 1000, 8, Some(&filters))
        .unwrap();
    assert!(hits.items.iter().all(|i| i.id != old));
    assert!(hits.items.iter().any(|i| i.id == new));
}

#[test]
fn deprecating_unknown_memory_is_not_found() {
    let db = TestDb::new();
    let err = db
        .engine
        .deprecate(&scope(), "no-such-id", "cleanup", None, None)
        .unwrap_err();
    assert_eq!(err.error_code(), Some("NOT_FOUND"));
}
