//! MemLayer CLI
//!
//! Every command prints exactly one JSON line:
//! `{"status":"ok","data":…}` or
//! `{"status":"error","message":…,"error_code"?:…}`. The process exits
//! zero unless argument parsing itself fails, so shell pipelines can
//! branch on the envelope instead of the exit code.

use std::path::PathBuf;
use std::process::Command as ProcessCommand;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use memlayer_core::{
    ArtifactRef, EpisodePayload, EventPayload, ForgetSelector, L2Draft, MemoryEngine, MemoryError,
    Result, Scope, SearchFilters, View,
};

/// MemLayer - lifecycle memory management for agents
#[derive(Parser)]
#[command(name = "memlayer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lifecycle memory engine CLI: L0/L1/L2 tiers, hybrid search, governance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store file and schema
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Event (L0) commands
    #[command(subcommand)]
    Event(EventCommands),

    /// Episode (L1) commands
    #[command(subcommand)]
    Episode(EpisodeCommands),

    /// Promote a validated draft into canonical memory (L2)
    Promote {
        /// Scope as JSON or @file
        #[arg(long)]
        scope: String,
        /// L2 draft as JSON or @file
        #[arg(long)]
        draft: String,
        /// Artifact reference as JSON or @file
        #[arg(long)]
        artifact: String,
        #[arg(long)]
        idempotency_key: String,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Link two L2 memories
    Link {
        #[arg(long)]
        scope: String,
        /// Source memory id
        #[arg(long)]
        from_id: String,
        /// Target memory id
        #[arg(long)]
        to_id: String,
        /// Relation label
        #[arg(long)]
        rel: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Search memory (L1/L2)
    Search {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "index")]
        view: String,
        #[arg(long, default_value_t = 1000)]
        budget: i64,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
        /// Optional filters as JSON or @file (type, status, query_embedding)
        #[arg(long)]
        filters: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Expand memory relations (L2) from a seed
    Expand {
        #[arg(long)]
        scope: String,
        /// Seed memory id
        #[arg(long)]
        seed: String,
        #[arg(long, default_value_t = 1)]
        hops: u32,
        #[arg(long, default_value = "detail")]
        view: String,
        #[arg(long, default_value_t = 1000)]
        budget: i64,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Deprecate a memory node
    Deprecate {
        #[arg(long)]
        scope: String,
        /// Memory id
        #[arg(long)]
        id: String,
        /// Reason for deprecation
        #[arg(long)]
        reason: String,
        /// Id of the superseding L2 node
        #[arg(long)]
        superseded_by: Option<String>,
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Forget memories by selector, leaving a tombstone
    Forget {
        #[arg(long)]
        scope: String,
        /// Selector as JSON or @file (user_id, start_time, end_time)
        #[arg(long)]
        selector: String,
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Garbage collection commands
    #[command(subcommand)]
    Gc(GcCommands),

    /// Check system health (store, graph accelerator)
    Doctor {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Manage the FalkorDB container
    #[command(subcommand)]
    Service(ServiceCommands),
}

#[derive(Subcommand)]
enum EventCommands {
    /// Upsert an event (L0)
    Upsert {
        #[arg(long)]
        scope: String,
        /// Event payload as JSON or @file
        #[arg(long)]
        payload: String,
        #[arg(long)]
        idempotency_key: String,
        /// Also distill the event into an L1 observation
        #[arg(long)]
        distill: bool,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum EpisodeCommands {
    /// Commit an episode summary (L1)
    Commit {
        #[arg(long)]
        scope: String,
        /// Episode payload as JSON or @file
        #[arg(long)]
        episode: String,
        #[arg(long)]
        idempotency_key: String,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GcCommands {
    /// Delete expired L0 rows
    Sweep {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Compact same-day observations into episode summaries
    Compact {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ServiceCommands {
    /// Start the FalkorDB container
    Start,
    /// Stop and remove the FalkorDB container
    Stop,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let envelope = match run(cli.command) {
        Ok(data) => json!({"status": "ok", "data": data}),
        Err(e) => match e.error_code() {
            Some(code) => json!({"status": "error", "message": e.to_string(), "error_code": code}),
            None => json!({"status": "error", "message": e.to_string()}),
        },
    };
    println!("{}", envelope);
}

/// Parse a `--flag` value that is either inline JSON or `@file`.
fn load_json(value: &str) -> Result<Value> {
    if let Some(path) = value.strip_prefix('@') {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(serde_json::from_str(value)?)
    }
}

fn parse_scope(value: &str) -> Result<Scope> {
    Ok(serde_json::from_value(load_json(value)?)?)
}

fn open_engine(db_path: Option<PathBuf>) -> Result<MemoryEngine> {
    let engine = MemoryEngine::new(db_path)?;
    engine.init()?;
    Ok(engine)
}

fn to_data<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn run(command: Commands) -> Result<Value> {
    match command {
        Commands::Init { db_path } => {
            let engine = open_engine(db_path)?;
            Ok(json!({
                "message": format!("Initialized database at {}", engine.store().path().display())
            }))
        }

        Commands::Event(EventCommands::Upsert {
            scope,
            payload,
            idempotency_key,
            distill,
            db_path,
        }) => {
            let scope = parse_scope(&scope)?;
            let payload: EventPayload = serde_json::from_value(load_json(&payload)?)?;
            let engine = open_engine(db_path)?;
            to_data(engine.upsert_event(&scope, &payload, &idempotency_key, distill)?)
        }

        Commands::Episode(EpisodeCommands::Commit {
            scope,
            episode,
            idempotency_key,
            db_path,
        }) => {
            let scope = parse_scope(&scope)?;
            let payload: EpisodePayload = serde_json::from_value(load_json(&episode)?)?;
            let engine = open_engine(db_path)?;
            to_data(engine.commit_episode(&scope, &payload, &idempotency_key)?)
        }

        Commands::Promote {
            scope,
            draft,
            artifact,
            idempotency_key,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let draft: L2Draft = serde_json::from_value(load_json(&draft)?)?;
            let artifact: ArtifactRef = serde_json::from_value(load_json(&artifact)?)?;
            let engine = open_engine(db_path)?;
            to_data(engine.promote_to_l2(&scope, &draft, &artifact, &idempotency_key)?)
        }

        Commands::Link {
            scope,
            from_id,
            to_id,
            rel,
            weight,
            idempotency_key,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let engine = open_engine(db_path)?;
            to_data(engine.link_memories(
                &scope,
                &from_id,
                &to_id,
                &rel,
                weight,
                idempotency_key.as_deref(),
            )?)
        }

        Commands::Search {
            scope,
            query,
            view,
            budget,
            top_k,
            filters,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let view: View = view.parse()?;
            let filters: Option<SearchFilters> = match filters {
                Some(raw) => Some(serde_json::from_value(load_json(&raw)?)?),
                None => None,
            };
            let engine = open_engine(db_path)?;
            to_data(engine.search(&scope, &query, view, budget, top_k, filters.as_ref())?)
        }

        Commands::Expand {
            scope,
            seed,
            hops,
            view,
            budget,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let view: View = view.parse()?;
            let engine = open_engine(db_path)?;
            to_data(engine.expand(&scope, &seed, hops, view, budget)?)
        }

        Commands::Deprecate {
            scope,
            id,
            reason,
            superseded_by,
            idempotency_key,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let engine = open_engine(db_path)?;
            to_data(engine.deprecate(
                &scope,
                &id,
                &reason,
                superseded_by.as_deref(),
                idempotency_key.as_deref(),
            )?)
        }

        Commands::Forget {
            scope,
            selector,
            idempotency_key,
            db_path,
        } => {
            let scope = parse_scope(&scope)?;
            let selector: ForgetSelector = serde_json::from_value(load_json(&selector)?)?;
            let engine = open_engine(db_path)?;
            to_data(engine.forget(&scope, &selector, idempotency_key.as_deref())?)
        }

        Commands::Gc(GcCommands::Sweep { db_path }) => {
            let engine = open_engine(db_path)?;
            to_data(engine.gc_sweep()?)
        }

        Commands::Gc(GcCommands::Compact { scope, db_path }) => {
            let scope = parse_scope(&scope)?;
            let engine = open_engine(db_path)?;
            to_data(engine.gc_compact(&scope)?)
        }

        Commands::Doctor { db_path } => run_doctor(db_path),

        Commands::Service(ServiceCommands::Start) => service_start(),
        Commands::Service(ServiceCommands::Stop) => service_stop(),
    }
}

fn run_doctor(db_path: Option<PathBuf>) -> Result<Value> {
    let sqlite = match open_engine(db_path) {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let graph = {
        let accelerator = memlayer_core::GraphAccelerator::connect();
        if accelerator.is_enabled() {
            "connected"
        } else {
            "disconnected"
        }
    };

    Ok(json!({"sqlite": sqlite, "graph": graph}))
}

fn service_start() -> Result<Value> {
    let status = ProcessCommand::new("docker")
        .args([
            "run", "-d", "-p", "6379:6379", "--name", "memlayer-falkor", "falkordb/falkordb",
        ])
        .status()?;

    if status.success() {
        Ok(json!({"message": "FalkorDB started"}))
    } else {
        Err(MemoryError::Init(
            "Failed to start FalkorDB (Docker required); a 'memlayer-falkor' container may already exist"
                .to_string(),
        ))
    }
}

fn service_stop() -> Result<Value> {
    let stopped = ProcessCommand::new("docker")
        .args(["stop", "memlayer-falkor"])
        .status()?;
    let removed = ProcessCommand::new("docker")
        .args(["rm", "memlayer-falkor"])
        .status()?;

    if stopped.success() && removed.success() {
        Ok(json!({"message": "FalkorDB stopped"}))
    } else {
        Err(MemoryError::Init("Failed to stop FalkorDB container".to_string()))
    }
}
