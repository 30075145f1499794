//! mem_promote - validate a draft and mint a canonical L2 node.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{ArtifactRef, Classification, L2Draft, MemoryEngine, SnippetPolicy};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "type": {
                "type": "string",
                "enum": ["Decision", "Contract", "VerifiedFact", "StableConstraint"]
            },
            "title": {"type": "string"},
            "summary": {"type": "string"},
            "artifact_locator": {"type": "string", "description": "Evidence locator (file path, URL, ...)"},
            "idempotency_key": {"type": "string"},
            "repo_id": {"type": "string"},
            "module": {"type": "string"},
            "environment": {"type": "string"},
            "claims": {"type": "array", "items": {"type": "string"}, "description": "At least one claim is required"},
            "tags": {"type": "array", "items": {"type": "string"}},
            "entities": {"type": "array", "items": {"type": "string"}},
            "applicability": {"type": "object"},
            "artifact_kind": {"type": "string", "default": "file"},
            "artifact_hash": {"type": "string"},
            "classification": {"type": "string", "enum": ["public", "internal", "restricted"], "default": "internal"},
            "snippet_policy": {"type": "string", "enum": ["allowed", "forbidden"], "default": "allowed"},
            "embedding": {
                "type": "array",
                "items": {"type": "number"},
                "description": "Pre-computed dense embedding for the node"
            }
        },
        "required": ["tenant_id", "workspace_id", "type", "title", "summary", "artifact_locator", "idempotency_key"]
    })
}

fn default_kind() -> String {
    "file".to_string()
}

#[derive(Debug, Deserialize)]
struct PromoteArgs {
    #[serde(flatten)]
    scope: FlatScope,
    #[serde(rename = "type")]
    l2_type: String,
    title: String,
    summary: String,
    artifact_locator: String,
    idempotency_key: String,
    #[serde(default)]
    claims: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    applicability: serde_json::Map<String, Value>,
    #[serde(default = "default_kind")]
    artifact_kind: String,
    #[serde(default)]
    artifact_hash: Option<String>,
    #[serde(default)]
    classification: Option<Classification>,
    #[serde(default)]
    snippet_policy: Option<SnippetPolicy>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: PromoteArgs = parse_args(args)?;
    let scope = args.scope.into_scope();

    let draft = L2Draft {
        l2_type: args.l2_type,
        title: args.title,
        summary: args.summary,
        tags: args.tags,
        entities: args.entities,
        claims: args.claims,
        applicability: args.applicability,
        embedding: args.embedding,
    };

    // memory_id is a placeholder; promotion rewrites it to the minted id
    let artifact = ArtifactRef {
        memory_id: "placeholder".to_string(),
        layer: "L2".to_string(),
        kind: args.artifact_kind,
        locator: args.artifact_locator,
        hash: args.artifact_hash,
        classification: args.classification.unwrap_or(Classification::Internal),
        snippet_policy: args.snippet_policy.unwrap_or(SnippetPolicy::Allowed),
        created_at: None,
    };

    Ok(envelope(engine.promote_to_l2(&scope, &draft, &artifact, &args.idempotency_key)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_engine;

    fn base_args() -> Value {
        serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "type": "VerifiedFact",
            "title": "Retries are capped at 3",
            "summary": "The gateway retries idempotent calls at most three times",
            "artifact_locator": "/tmp/evidence.txt",
            "idempotency_key": "k1",
            "claims": ["max_retries == 3"]
        })
    }

    #[tokio::test]
    async fn valid_draft_promotes() {
        let (engine, _dir) = test_engine();
        let result = execute(&engine, Some(base_args())).await.unwrap();
        assert_eq!(result["status"], "ok");
        assert!(result["data"]["id"].is_string());
    }

    #[tokio::test]
    async fn empty_claims_yield_validation_error_envelope() {
        let (engine, _dir) = test_engine();
        let mut args = base_args();
        args["claims"] = serde_json::json!([]);

        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["status"], "error");
        assert_eq!(result["error_code"], "PROMOTION_VALIDATION_FAILED");
        assert_eq!(result["message"], "No claims provided");
    }

    #[tokio::test]
    async fn unknown_type_yields_validation_error_envelope() {
        let (engine, _dir) = test_engine();
        let mut args = base_args();
        args["type"] = serde_json::json!("Rumor");

        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["status"], "error");
        assert_eq!(result["error_code"], "PROMOTION_VALIDATION_FAILED");
    }
}
