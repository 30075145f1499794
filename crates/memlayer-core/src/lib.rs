//! # MemLayer Core
//!
//! Lifecycle-aware memory engine for autonomous agents. Raw interaction
//! events are distilled through three durability tiers:
//!
//! - **L0** working memory: raw events with a 24h TTL
//! - **L1** episodic memory: distilled observations and episode summaries
//! - **L2** semantic memory: validated canonical nodes plus a relation graph
//!
//! On top of the tiers the engine provides hybrid lexical + vector
//! retrieval (FTS5 + sqlite-vec), token-budgeted result packaging,
//! variable-hop graph expansion with a best-effort FalkorDB accelerator,
//! and principled forgetting (deprecation, tombstones, TTL sweep, daily
//! compaction).
//!
//! Every mutating operation is gated by a per-tenant idempotency key:
//! replaying a call returns the first recorded result without touching
//! the tables again.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use memlayer_core::{MemoryEngine, Scope, EventPayload};
//!
//! let engine = MemoryEngine::new(Some("memlayer.db".into()))?;
//! engine.init()?;
//!
//! let scope = Scope::new("t1", "w1");
//! let payload = EventPayload::from_content("System crash due to memory leak");
//! let outcome = engine.upsert_event(&scope, &payload, "evt-1", true)?;
//!
//! let hits = engine.search(&scope, "memory leak", View::Index, 1000, 8, None)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite into the binary
//! - `vector-search` (default): sqlite-vec distance function for hybrid search
//! - `graph-accelerator` (default): FalkorDB projection and traversal

// ============================================================================
// MODULES
// ============================================================================

pub mod engine;
pub mod error;
pub mod governance;
pub mod graph;
pub mod ingest;
pub mod model;
pub mod retrieval;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use engine::MemoryEngine;

pub use error::{MemoryError, Result};

pub use model::{
    ArtifactRef, Classification, EpisodePayload, EventPayload, L1Status, L1Type, L2Draft,
    L2Status, L2Type, Scope, SnippetPolicy, View,
};

pub use storage::Store;

pub use ingest::{
    EpisodeOutcome, EventOutcome, LinkOutcome, PromoteOutcome, PromotionPolicy,
};

pub use retrieval::{
    ArtifactView, PathTriple, SearchFilters, SearchItem, SearchResponse, Truncation,
};

pub use graph::{GraphAccelerator, GraphExpansion};

pub use governance::{
    CompactOutcome, DeprecateOutcome, ForgetOutcome, ForgetSelector, SweepOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
