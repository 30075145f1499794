//! MemLayer tool server.
//!
//! Exposes the lifecycle memory engine as agent-callable tools over
//! line-delimited JSON-RPC on stdio. The primary store is SQLite; the
//! FalkorDB graph accelerator is probed at startup and silently skipped
//! when unreachable.

mod protocol;
mod server;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use memlayer_core::MemoryEngine;

use crate::protocol::stdio::StdioTransport;
use crate::server::ToolServer;

/// Parse command-line arguments, returning the optional store path.
/// Exits the process for `--help` / `--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("MemLayer tool server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Lifecycle memory for agents over JSON-RPC stdio.");
                println!();
                println!("USAGE:");
                println!("    memlayer-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --db-path <PATH>        Custom store file location");
                println!();
                println!("ENVIRONMENT:");
                println!("    MEMLAYER_DB_PATH        Store file location (overridden by --db-path)");
                println!("    MEMLAYER_GRAPH_URL      FalkorDB address (default redis://127.0.0.1:6379)");
                println!("    MEMLAYER_GRAPH_DISABLED Force the relational fallback");
                println!("    RUST_LOG                Log filter (e.g. debug, info, warn)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("memlayer-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db-path" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--db-path=") => {
                let path = arg.strip_prefix("--db-path=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'memlayer-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    db_path.or_else(|| std::env::var("MEMLAYER_DB_PATH").ok().map(PathBuf::from))
}

#[tokio::main]
async fn main() {
    let db_path = parse_args();

    // stdout belongs to the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let engine = match MemoryEngine::new(db_path) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to open memory engine: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = engine.init() {
        error!("failed to initialize store: {}", e);
        std::process::exit(1);
    }

    info!(
        "memlayer tool server v{} starting (graph accelerator: {})",
        env!("CARGO_PKG_VERSION"),
        if engine.graph().is_enabled() { "enabled" } else { "disabled" },
    );

    let server = ToolServer::new(Arc::new(engine));
    if let Err(e) = StdioTransport::new().run(server).await {
        error!("transport error: {}", e);
        std::process::exit(1);
    }
}
