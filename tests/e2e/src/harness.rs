//! Isolated engine instances for end-to-end tests.
//!
//! Each [`TestDb`] owns a temporary directory holding the store file
//! and any artifact fixtures; everything is deleted on drop. The graph
//! accelerator is disabled so tests exercise the relational fallback
//! deterministically.

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

use memlayer_core::{
    ArtifactRef, Classification, EventPayload, GraphAccelerator, L2Draft, MemoryEngine, Scope,
    SnippetPolicy,
};

/// An engine over a throwaway database.
pub struct TestDb {
    pub engine: MemoryEngine,
    temp_dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let engine = MemoryEngine::with_graph(
            Some(temp_dir.path().join("memlayer.db")),
            GraphAccelerator::disabled(),
        )
        .expect("failed to open test engine");
        engine.init().expect("failed to initialize test store");
        Self { engine, temp_dir }
    }

    /// Write a fixture file inside the test directory and return its path.
    pub fn fixture_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("failed to create fixture");
        file.write_all(contents).expect("failed to write fixture");
        path
    }

    /// Distill an event and return the resulting observation id.
    pub fn seed_observation(&self, scope: &Scope, content: &str, key: &str) -> String {
        self.engine
            .upsert_event(scope, &EventPayload::from_content(content), key, true)
            .expect("upsert failed")
            .l1_id
            .expect("distillation produced no observation")
    }

    /// Promote a minimal VerifiedFact with a file artifact.
    pub fn seed_fact(&self, scope: &Scope, title: &str, locator: &str, key: &str) -> String {
        let draft = L2Draft {
            l2_type: "VerifiedFact".to_string(),
            title: title.to_string(),
            summary: format!("{title} summary"),
            tags: vec![],
            entities: vec![],
            claims: vec!["claim".to_string()],
            applicability: serde_json::Map::new(),
            embedding: None,
        };
        let artifact = ArtifactRef {
            memory_id: "placeholder".to_string(),
            layer: "L2".to_string(),
            kind: "file".to_string(),
            locator: locator.to_string(),
            hash: None,
            classification: Classification::Internal,
            snippet_policy: SnippetPolicy::Allowed,
            created_at: None,
        };
        self.engine
            .promote_to_l2(scope, &draft, &artifact, key)
            .expect("promotion failed")
            .id
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard test scope.
pub fn scope() -> Scope {
    Scope::new("t1", "w1")
}
