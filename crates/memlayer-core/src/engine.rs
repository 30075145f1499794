//! Engine facade.
//!
//! [`MemoryEngine`] owns the store handle and the graph accelerator and
//! exposes the full operation surface with per-call connection
//! acquisition. Callers who hold their own connection (tests, embedded
//! use) can call the module-level functions directly.

use std::path::PathBuf;

use crate::error::Result;
use crate::governance::{
    self, CompactOutcome, DeprecateOutcome, ForgetOutcome, ForgetSelector, SweepOutcome,
};
use crate::graph::{self, GraphAccelerator};
use crate::ingest::{
    self, EpisodeOutcome, EventOutcome, LinkOutcome, PromoteOutcome, PromotionPolicy,
};
use crate::model::{ArtifactRef, EpisodePayload, EventPayload, L2Draft, Scope, View};
use crate::retrieval::{self, SearchFilters, SearchResponse};
use crate::storage::Store;

/// Lifecycle memory engine over one store file.
///
/// All methods take `&self`; each acquires a fresh connection and
/// commits a single transaction, so the engine is `Send + Sync` and the
/// tool server can hold it in an `Arc` without interior locking.
pub struct MemoryEngine {
    store: Store,
    graph: GraphAccelerator,
    promotion_policy: PromotionPolicy,
}

impl MemoryEngine {
    /// Open an engine on the given store path (platform default when
    /// `None`) and probe the graph accelerator.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: Store::open(db_path)?,
            graph: GraphAccelerator::connect(),
            promotion_policy: PromotionPolicy::default(),
        })
    }

    /// Open an engine with an explicit accelerator, e.g. a disabled one
    /// for hook invocations that never touch the graph.
    pub fn with_graph(db_path: Option<PathBuf>, graph: GraphAccelerator) -> Result<Self> {
        Ok(Self {
            store: Store::open(db_path)?,
            graph,
            promotion_policy: PromotionPolicy::default(),
        })
    }

    /// Switch promotion scope-tightness enforcement.
    pub fn with_promotion_policy(mut self, policy: PromotionPolicy) -> Self {
        self.promotion_policy = policy;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn graph(&self) -> &GraphAccelerator {
        &self.graph
    }

    /// Create the store file and apply migrations.
    pub fn init(&self) -> Result<()> {
        self.store.init()?;
        Ok(())
    }

    pub fn upsert_event(
        &self,
        scope: &Scope,
        payload: &EventPayload,
        idempotency_key: &str,
        distill: bool,
    ) -> Result<EventOutcome> {
        let mut conn = self.store.acquire()?;
        ingest::upsert_event(&mut conn, scope, payload, idempotency_key, distill)
    }

    pub fn commit_episode(
        &self,
        scope: &Scope,
        payload: &EpisodePayload,
        idempotency_key: &str,
    ) -> Result<EpisodeOutcome> {
        let mut conn = self.store.acquire()?;
        ingest::commit_episode(&mut conn, scope, payload, idempotency_key)
    }

    pub fn promote_to_l2(
        &self,
        scope: &Scope,
        draft: &L2Draft,
        artifact: &ArtifactRef,
        idempotency_key: &str,
    ) -> Result<PromoteOutcome> {
        let mut conn = self.store.acquire()?;
        ingest::promote_to_l2(
            &mut conn,
            &self.graph,
            scope,
            draft,
            artifact,
            idempotency_key,
            self.promotion_policy,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn link_memories(
        &self,
        scope: &Scope,
        from_id: &str,
        to_id: &str,
        rel: &str,
        weight: f64,
        idempotency_key: Option<&str>,
    ) -> Result<LinkOutcome> {
        let mut conn = self.store.acquire()?;
        ingest::link_memories(
            &mut conn,
            &self.graph,
            scope,
            from_id,
            to_id,
            rel,
            weight,
            idempotency_key,
        )
    }

    pub fn search(
        &self,
        scope: &Scope,
        query: &str,
        view: View,
        budget: i64,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<SearchResponse> {
        let conn = self.store.acquire()?;
        retrieval::search_memory(&conn, scope, query, view, budget, top_k, filters)
    }

    pub fn expand(
        &self,
        scope: &Scope,
        seed_id: &str,
        hops: u32,
        view: View,
        budget: i64,
    ) -> Result<SearchResponse> {
        let conn = self.store.acquire()?;
        graph::expand_memory(&conn, &self.graph, scope, seed_id, hops, view, budget)
    }

    pub fn deprecate(
        &self,
        scope: &Scope,
        memory_id: &str,
        reason: &str,
        superseded_by: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<DeprecateOutcome> {
        let mut conn = self.store.acquire()?;
        governance::deprecate_memory(
            &mut conn,
            scope,
            memory_id,
            reason,
            superseded_by,
            idempotency_key,
        )
    }

    pub fn forget(
        &self,
        scope: &Scope,
        selector: &ForgetSelector,
        idempotency_key: Option<&str>,
    ) -> Result<ForgetOutcome> {
        let mut conn = self.store.acquire()?;
        governance::forget_memory(&mut conn, scope, selector, idempotency_key)
    }

    pub fn gc_sweep(&self) -> Result<SweepOutcome> {
        let mut conn = self.store.acquire()?;
        governance::gc_sweep(&mut conn)
    }

    pub fn gc_compact(&self, scope: &Scope) -> Result<CompactOutcome> {
        let mut conn = self.store.acquire()?;
        governance::gc_compact(&mut conn, scope)
    }
}
