//! Tool registry for the JSON-RPC server.
//!
//! One module per tool, each exposing `schema()` and `execute()`. Tool
//! results are the same envelope the CLI prints:
//! `{"status":"ok","data":…}` or
//! `{"status":"error","message":…,"error_code"?:…}`.

pub mod commit;
pub mod deprecate;
pub mod expand;
pub mod forget;
pub mod link;
pub mod promote;
pub mod search;
pub mod upsert;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{MemoryEngine, MemoryError, Scope};

/// Tool metadata for `tools/list`
pub struct ToolDescription {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

/// Every registered tool, in listing order.
pub fn descriptions() -> Vec<ToolDescription> {
    vec![
        ToolDescription {
            name: "mem_upsert",
            description: "Upsert an event (L0) to working memory; optionally distill to an L1 observation",
            schema: upsert::schema(),
        },
        ToolDescription {
            name: "mem_commit",
            description: "Commit an episode summary (L1) to episodic memory",
            schema: commit::schema(),
        },
        ToolDescription {
            name: "mem_promote",
            description: "Promote a validated fact/decision into canonical memory (L2)",
            schema: promote::schema(),
        },
        ToolDescription {
            name: "mem_link",
            description: "Link two L2 memory nodes with a weighted relation",
            schema: link::schema(),
        },
        ToolDescription {
            name: "mem_search",
            description: "Hybrid search over episodic and canonical memory",
            schema: search::schema(),
        },
        ToolDescription {
            name: "mem_expand",
            description: "Expand memory relations (L2) from a seed node",
            schema: expand::schema(),
        },
        ToolDescription {
            name: "mem_forget",
            description: "Forget memories by selector, leaving a tombstone",
            schema: forget::schema(),
        },
        ToolDescription {
            name: "mem_deprecate",
            description: "Deprecate a memory node, optionally recording its successor",
            schema: deprecate::schema(),
        },
    ]
}

/// Route a `tools/call` to its implementation. `None` means the tool is
/// unknown.
pub async fn dispatch(
    name: &str,
    engine: &Arc<MemoryEngine>,
    args: Option<Value>,
) -> Option<Result<Value, String>> {
    let result = match name {
        "mem_upsert" => upsert::execute(engine, args).await,
        "mem_commit" => commit::execute(engine, args).await,
        "mem_promote" => promote::execute(engine, args).await,
        "mem_link" => link::execute(engine, args).await,
        "mem_search" => search::execute(engine, args).await,
        "mem_expand" => expand::execute(engine, args).await,
        "mem_forget" => forget::execute(engine, args).await,
        "mem_deprecate" => deprecate::execute(engine, args).await,
        _ => return None,
    };
    Some(result)
}

/// Flat scope arguments shared by every tool.
#[derive(Debug, Deserialize)]
pub(crate) struct FlatScope {
    pub tenant_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl FlatScope {
    pub fn into_scope(self) -> Scope {
        Scope {
            tenant_id: self.tenant_id,
            workspace_id: self.workspace_id,
            repo_id: self.repo_id,
            module: self.module,
            environment: self.environment,
            user_id: self.user_id,
            session_id: self.session_id,
            task_id: self.task_id,
        }
    }
}

/// Deserialize tool arguments, mapping failures to invalid-params.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T, String> {
    match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}")),
        None => Err("Missing arguments".to_string()),
    }
}

/// Wrap an engine result in the shared envelope.
pub(crate) fn envelope<T: serde::Serialize>(result: memlayer_core::Result<T>) -> Value {
    match result.and_then(|data| serde_json::to_value(data).map_err(MemoryError::from)) {
        Ok(data) => serde_json::json!({"status": "ok", "data": data}),
        Err(e) => error_envelope(&e),
    }
}

pub(crate) fn error_envelope(e: &MemoryError) -> Value {
    match e.error_code() {
        Some(code) => serde_json::json!({
            "status": "error",
            "message": e.to_string(),
            "error_code": code,
        }),
        None => serde_json::json!({
            "status": "error",
            "message": e.to_string(),
        }),
    }
}
