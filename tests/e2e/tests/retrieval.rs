//! Retrieval journeys: promote-search-evidence round trips, budget
//! enforcement, and graph expansion with artifact snippets.

use memlayer_e2e_tests::harness::{scope, TestDb};

use memlayer_core::{PathTriple, View};

#[test]
fn promoted_fact_round_trips_to_evidence_snippet() {
    let db = TestDb::new();
    // 2 KiB fixture: the snippet must clamp to the first 1024 bytes
    let contents: Vec<u8> = (0..2048u32).map(|i| b'a' + (i % 26) as u8).collect();
    let path = db.fixture_file("evidence.txt", &contents);

    db.seed_fact(&scope(), "indexing contract", path.to_str().unwrap(), "k1");

    let hits = db
        .engine
        .search(&scope(), "indexing contract", View::Evidence, 10_000, 8, None)
        .unwrap();
    let artifacts = hits.items[0].artifacts.as_ref().unwrap();
    let snippet = artifacts[0].snippet.as_deref().unwrap();

    assert_eq!(snippet.len(), 1024);
    assert_eq!(snippet.as_bytes(), &contents[..1024]);
}

#[test]
fn forbidden_snippet_policy_suppresses_content() {
    let db = TestDb::new();
    let path = db.fixture_file("secret.txt", b"do not leak");

    let draft = memlayer_core::L2Draft {
        l2_type: "Contract".to_string(),
        title: "sealed evidence".to_string(),
        summary: "artifact content must not surface".to_string(),
        tags: vec![],
        entities: vec![],
        claims: vec!["sealed".to_string()],
        applicability: serde_json::Map::new(),
        embedding: None,
    };
    let artifact = memlayer_core::ArtifactRef {
        memory_id: "placeholder".to_string(),
        layer: "L2".to_string(),
        kind: "file".to_string(),
        locator: path.to_string_lossy().into_owned(),
        hash: None,
        classification: memlayer_core::Classification::Restricted,
        snippet_policy: memlayer_core::SnippetPolicy::Forbidden,
        created_at: None,
    };
    db.engine.promote_to_l2(&scope(), &draft, &artifact, "k1").unwrap();

    let hits = db
        .engine
        .search(&scope(), "sealed evidence", View::Evidence, 10_000, 8, None)
        .unwrap();
    let artifacts = hits.items[0].artifacts.as_ref().unwrap();
    assert_eq!(artifacts[0].snippet_policy, "forbidden");
    assert!(artifacts[0].snippet.is_none());
}

#[test]
fn two_items_under_tiny_budget_yield_empty_truncated_result() {
    let db = TestDb::new();
    db.seed_observation(&scope(), "budget scenario first row", "k1");
    db.seed_observation(&scope(), "budget scenario second row", "k2");

    let hits = db
        .engine
        .search(&scope(), "budget scenario", View::Evidence, 10, 8, None)
        .unwrap();
    assert!(hits.items.is_empty());
    assert!(hits.truncation.truncated);
    assert_eq!(hits.truncation.reason.as_deref(), Some("TOKEN_BUDGET"));
}

#[test]
fn larger_budget_packs_items_in_rank_order() {
    let db = TestDb::new();
    for i in 0..4 {
        db.seed_observation(&scope(), &format!("ranked packing row {i}"), &format!("k{i}"));
    }

    let hits = db
        .engine
        .search(&scope(), "ranked packing", View::Index, 10_000, 3, None)
        .unwrap();
    assert!(hits.items.len() <= 3);
    assert!(!hits.truncation.truncated);

    let mut scores: Vec<f64> = hits.items.iter().map(|i| i.score).collect();
    let sorted = {
        let mut s = scores.clone();
        s.sort_by(|a, b| b.partial_cmp(a).unwrap());
        s
    };
    assert_eq!(scores, sorted);
    scores.dedup();
    assert!(!scores.is_empty());
}

#[test]
fn link_then_expand_returns_neighbor_with_snippet_and_path() {
    let db = TestDb::new();
    let hello = db.fixture_file("hello.txt", b"hello");

    let a = db.seed_fact(&scope(), "fact alpha", "/tmp/none", "k1");
    let b = db.seed_fact(&scope(), "fact beta", hello.to_str().unwrap(), "k2");
    db.engine
        .link_memories(&scope(), &a, &b, "RELATED_TO", 1.0, None)
        .unwrap();

    let result = db
        .engine
        .expand(&scope(), &a, 1, View::Evidence, 10_000)
        .unwrap();

    let item = result.items.iter().find(|i| i.id == b).expect("neighbor missing");
    let artifacts = item.artifacts.as_ref().unwrap();
    assert_eq!(artifacts[0].snippet.as_deref(), Some("hello"));

    let paths = result.paths.unwrap();
    assert!(paths.contains(&PathTriple {
        from: a,
        rel: "RELATED_TO".to_string(),
        to: b,
    }));
}

#[test]
fn expansion_is_tenant_isolated() {
    let db = TestDb::new();
    let a = db.seed_fact(&scope(), "isolated alpha", "/tmp/none-a", "k1");
    let b = db.seed_fact(&scope(), "isolated beta", "/tmp/none-b", "k2");
    db.engine
        .link_memories(&scope(), &a, &b, "DEPENDS_ON", 1.0, None)
        .unwrap();

    let foreign = memlayer_core::Scope::new("t2", "w1");
    let result = db
        .engine
        .expand(&foreign, &a, 1, View::Index, 10_000)
        .unwrap();
    assert!(result.items.is_empty());
}
