//! mem_search - hybrid retrieval over L1 and L2.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{MemoryEngine, SearchFilters, View};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "query": {"type": "string"},
            "repo_id": {"type": "string", "description": "Also matches rows with no repo qualifier"},
            "view": {"type": "string", "enum": ["index", "detail", "evidence"], "default": "index"},
            "budget": {"type": "integer", "description": "Token budget for the packaged result", "default": 1000},
            "top_k": {"type": "integer", "default": 8, "minimum": 1, "maximum": 100},
            "filters": {
                "type": "object",
                "description": "Optional type/status equality filters and a pre-computed query_embedding"
            }
        },
        "required": ["tenant_id", "workspace_id", "query"]
    })
}

fn default_budget() -> i64 {
    1000
}

fn default_top_k() -> usize {
    8
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(flatten)]
    scope: FlatScope,
    query: String,
    #[serde(default)]
    view: Option<String>,
    #[serde(default = "default_budget")]
    budget: i64,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    filters: Option<SearchFilters>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: SearchArgs = parse_args(args)?;
    if args.query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }

    let view: View = args
        .view
        .as_deref()
        .unwrap_or("index")
        .parse()
        .map_err(|e| format!("Invalid arguments: {e}"))?;
    let scope = args.scope.into_scope();
    let top_k = args.top_k.clamp(1, 100);

    Ok(envelope(engine.search(
        &scope,
        &args.query,
        view,
        args.budget,
        top_k,
        args.filters.as_ref(),
    )))
}

// ============================================================================
// TESTS
// ============================================================================
