//! Governance journeys: forgetting with tombstones, TTL sweep, and
//! daily compaction.

use memlayer_e2e_tests::harness::{scope, TestDb};

use memlayer_core::{ForgetSelector, View};

#[test]
fn forget_leaves_tombstone_and_purges_l1() {
    let db = TestDb::new();
    let mut user_scope = scope();
    user_scope.user_id = Some("u1".to_string());
    db.seed_observation(&user_scope, "user note to forget", "k1");

    let selector = ForgetSelector {
        user_id: Some("u1".to_string()),
        ..Default::default()
    };
    let outcome = db.engine.forget(&scope(), &selector, None).unwrap();
    assert_eq!(outcome.deleted_l1, 1);
    assert_eq!(outcome.tombstone_hash, selector.selector_hash());

    // The forgotten row no longer surfaces in search
    let hits = db
        .engine
        .search(&scope(), "user note", View::Index, 1000, 8, None)
        .unwrap();
    assert!(hits.items.is_empty());
}

#[test]
fn forgetting_twice_absorbs_the_tombstone_collision() {
    let db = TestDb::new();
    let selector = ForgetSelector {
        user_id: Some("u9".to_string()),
        ..Default::default()
    };

    let first = db.engine.forget(&scope(), &selector, None).unwrap();
    let second = db.engine.forget(&scope(), &selector, None).unwrap();
    assert_eq!(first.tombstone_hash, second.tombstone_hash);
}

#[test]
fn sweep_clears_expired_working_memory() {
    let db = TestDb::new();
    db.seed_observation(&scope(), "fresh enough to keep", "k1");

    // Freshly ingested rows have a day of TTL left
    let outcome = db.engine.gc_sweep().unwrap();
    assert_eq!(outcome.deleted_l0, 0);
}

#[test]
fn compaction_folds_three_observations_into_one_episode() {
    let db = TestDb::new();
    let mut compact_scope = scope();
    compact_scope.repo_id = Some("r1".to_string());
    compact_scope.module = Some("core".to_string());

    for i in 0..3 {
        db.engine
            .upsert_event(
                &compact_scope,
                &memlayer_core::EventPayload::from_content(format!("observation {i}")),
                &format!("k{i}"),
                true,
            )
            .unwrap();
    }

    let outcome = db.engine.gc_compact(&compact_scope).unwrap();
    assert_eq!(outcome.compacted_observations, 3);
    assert_eq!(outcome.episodes_created, 1);

    // The synthesized episode carries the compaction summary and the
    // archived sources drop out of active-status search
    let hits = db
        .engine
        .search(&compact_scope, "Episode core", View::Detail, 10_000, 8, None)
        .unwrap();
    let episode = hits
        .items
        .iter()
        .find(|i| i.memory_type == "EpisodeSummary")
        .expect("episode missing from search");
    assert!(episode
        .summary
        .as_deref()
        .unwrap()
        .starts_with("Compacted 3 observations."));
    assert_eq!(episode.confidence, Some(0.8));

    let filters = memlayer_core::SearchFilters {
        memory_type: Some("Observation".to_string()),
        status: Some("active".to_string()),
        ..Default::default()
    };
    let active = db
        .engine
        .search(&compact_scope, "observation", View::Index, 10_000, 8, Some(&filters))
        .unwrap();
    assert!(active.items.is_empty());
}

#[test]
fn compaction_preserves_unrelated_scopes() {
    let db = TestDb::new();
    for i in 0..2 {
        db.seed_observation(&scope(), &format!("compactable {i}"), &format!("k{i}"));
    }
    let other_scope = memlayer_core::Scope::new("t1", "w-other");
    db.seed_observation(&other_scope, "untouched neighbor", "k-other");

    db.engine.gc_compact(&scope()).unwrap();

    let filters = memlayer_core::SearchFilters {
        status: Some("active".to_string()),
        ..Default::default()
    };
    let hits = db
        .engine
        .search(&other_scope, "untouched neighbor", View::Index, 1000, 8, Some(&filters))
        .unwrap();
    assert_eq!(hits.items.len(), 1);
}
