//! mem_commit - episode summary consolidation.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{EpisodePayload, MemoryEngine};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "title": {"type": "string"},
            "summary": {"type": "string"},
            "idempotency_key": {"type": "string"},
            "repo_id": {"type": "string"},
            "session_id": {"type": "string", "description": "Episodes merge per session id"},
            "task_id": {"type": "string", "description": "Fallback episode key when no session id"},
            "tags": {"type": "array", "items": {"type": "string"}},
            "entities": {"type": "array", "items": {"type": "string"}},
            "claims": {"type": "array", "items": {"type": "string"}},
            "applicability": {"type": "object"},
            "embedding": {
                "type": "array",
                "items": {"type": "number"},
                "description": "Pre-computed dense embedding for the episode"
            }
        },
        "required": ["tenant_id", "workspace_id", "title", "summary", "idempotency_key"]
    })
}

#[derive(Debug, Deserialize)]
struct CommitArgs {
    #[serde(flatten)]
    scope: FlatScope,
    title: String,
    summary: String,
    idempotency_key: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    claims: Vec<String>,
    #[serde(default)]
    applicability: serde_json::Map<String, Value>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: CommitArgs = parse_args(args)?;
    let scope = args.scope.into_scope();
    let payload = EpisodePayload {
        title: args.title,
        summary: args.summary,
        tags: args.tags,
        entities: args.entities,
        claims: args.claims,
        applicability: args.applicability,
        embedding: args.embedding,
    };

    Ok(envelope(engine.commit_episode(&scope, &payload, &args.idempotency_key)))
}
