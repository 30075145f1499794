//! MemLayer hook driver.
//!
//! Invoked by a host agent runtime on lifecycle events. Reads one JSON
//! event payload from stdin, the event name from `MEMLAYER_HOOK_EVENT`,
//! and the scope from `MEMLAYER_*` environment variables, then feeds
//! the engine. On `UserPromptSubmit` it also searches memory and prints
//! context lines for the host to inject. Always exits zero so a memory
//! failure never blocks the agent.

use std::io::Read;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use memlayer_core::{
    EventPayload, GraphAccelerator, MemoryEngine, Scope, SearchResponse, View,
};

const OUTPUT_TRUNCATE: usize = 1000;

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn scope_from_env() -> Scope {
    let workspace_fallback = std::env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "default".to_string());

    Scope {
        tenant_id: env("MEMLAYER_TENANT_ID").unwrap_or_else(|| "default".to_string()),
        workspace_id: env("MEMLAYER_WORKSPACE_ID").unwrap_or(workspace_fallback),
        repo_id: env("MEMLAYER_REPO_ID"),
        module: env("MEMLAYER_MODULE"),
        environment: env("MEMLAYER_ENVIRONMENT"),
        user_id: env("MEMLAYER_USER_ID"),
        session_id: env("MEMLAYER_SESSION_ID"),
        task_id: env("MEMLAYER_TASK_ID"),
    }
}

fn read_stdin_json() -> Value {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() || raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(&raw).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

fn extract_prompt(payload: &Value) -> Option<String> {
    for key in ["prompt", "input", "message", "user_prompt"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

fn extract_tool(payload: &Value) -> (Option<String>, Option<String>) {
    let tool_name = ["tool_name", "toolName", "tool"]
        .iter()
        .find_map(|k| payload.get(k).and_then(Value::as_str))
        .map(String::from);
    let output = ["output", "result", "response"]
        .iter()
        .find_map(|k| payload.get(k))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    (tool_name, output)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    }
}

fn metadata(pairs: Vec<(&str, Value)>) -> serde_json::Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn record_event(engine: &MemoryEngine, scope: &Scope, content: String, meta: serde_json::Map<String, Value>) {
    let payload = EventPayload {
        content,
        metadata: Some(meta),
    };
    let key = Uuid::new_v4().to_string();
    if let Err(e) = engine.upsert_event(scope, &payload, &key, false) {
        tracing::warn!("hook event upsert failed: {}", e);
    }
}

fn emit_search_context(response: &SearchResponse) {
    if response.items.is_empty() {
        return;
    }
    println!("MemLayer Search Results:");
    for item in &response.items {
        match item.summary.as_deref() {
            Some(summary) if !summary.is_empty() => {
                println!("- [{}] {} :: {}", item.id, item.title, truncate(summary, 200));
            }
            _ => println!("- [{}] {}", item.id, item.title),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let event = env("MEMLAYER_HOOK_EVENT").unwrap_or_default();
    let db_path = env("MEMLAYER_DB_PATH").map(PathBuf::from);
    let payload = read_stdin_json();
    let scope = scope_from_env();
    let timestamp = Utc::now().to_rfc3339();

    // The hook only upserts and searches; skip the accelerator probe to
    // keep the agent's critical path fast
    let engine = match MemoryEngine::with_graph(db_path, GraphAccelerator::disabled()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!("hook could not open engine: {}", e);
            return;
        }
    };
    if let Err(e) = engine.init() {
        tracing::warn!("hook could not initialize store: {}", e);
        return;
    }

    match event.as_str() {
        "SessionStart" => {
            let content = format!("Session started at {timestamp}.");
            record_event(&engine, &scope, content, metadata(vec![("event", event.clone().into())]));
        }
        "UserPromptSubmit" => {
            if let Some(prompt) = extract_prompt(&payload) {
                record_event(
                    &engine,
                    &scope,
                    prompt.clone(),
                    metadata(vec![("event", event.clone().into())]),
                );
                match engine.search(&scope, &prompt, View::Detail, 1000, 8, None) {
                    Ok(response) => emit_search_context(&response),
                    Err(e) => tracing::warn!("hook search failed: {}", e),
                }
            }
        }
        "PostToolUse" => {
            let (tool_name, output) = extract_tool(&payload);
            if let Some(tool_name) = tool_name {
                let content = format!("Tool used: {tool_name}");
                let meta = metadata(vec![
                    ("event", event.clone().into()),
                    (
                        "output",
                        truncate(output.as_deref().unwrap_or(""), OUTPUT_TRUNCATE).into(),
                    ),
                ]);
                record_event(&engine, &scope, content, meta);
            }
        }
        "PreCompact" => {
            let content = format!("Context compaction triggered at {timestamp}.");
            record_event(&engine, &scope, content, metadata(vec![("event", event.clone().into())]));
        }
        "Stop" => {
            let content = format!("Session ended at {timestamp}.");
            record_event(&engine, &scope, content, metadata(vec![("event", event.clone().into())]));
        }
        other => {
            tracing::debug!("ignoring unhandled hook event '{}'", other);
        }
    }
}
