//! mem_expand - relation neighborhood of a canonical node.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{MemoryEngine, View};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "seed_id": {"type": "string", "description": "L2 node to expand from"},
            "hops": {"type": "integer", "default": 1, "minimum": 1, "maximum": 4},
            "view": {"type": "string", "enum": ["index", "detail", "evidence"], "default": "detail"},
            "budget": {"type": "integer", "default": 1000}
        },
        "required": ["tenant_id", "workspace_id", "seed_id"]
    })
}

fn default_hops() -> u32 {
    1
}

fn default_budget() -> i64 {
    1000
}

#[derive(Debug, Deserialize)]
struct ExpandArgs {
    #[serde(flatten)]
    scope: FlatScope,
    seed_id: String,
    #[serde(default = "default_hops")]
    hops: u32,
    #[serde(default)]
    view: Option<String>,
    #[serde(default = "default_budget")]
    budget: i64,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: ExpandArgs = parse_args(args)?;
    let view: View = args
        .view
        .as_deref()
        .unwrap_or("detail")
        .parse()
        .map_err(|e| format!("Invalid arguments: {e}"))?;
    let scope = args.scope.into_scope();
    let hops = args.hops.clamp(1, 4);

    Ok(envelope(engine.expand(&scope, &args.seed_id, hops, view, args.budget)))
}
