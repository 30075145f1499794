//! Typed entities shared across the engine.
//!
//! Everything here is tenant-scoped: [`Scope`] carries the mandatory
//! `(tenant_id, workspace_id)` prefix plus the optional qualifiers, and
//! every operation validates it before touching the store.

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

// ============================================================================
// SCOPE
// ============================================================================

/// Addressing tuple for every memory operation.
///
/// `tenant_id` and `workspace_id` are mandatory and must be non-empty;
/// the remaining qualifiers narrow where a memory applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Scope {
    /// Create a scope with only the mandatory prefix set.
    pub fn new(tenant_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id: workspace_id.into(),
            repo_id: None,
            module: None,
            environment: None,
            user_id: None,
            session_id: None,
            task_id: None,
        }
    }

    /// Reject empty mandatory fields.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(MemoryError::InvalidInput("tenant_id must be non-empty".into()));
        }
        if self.workspace_id.trim().is_empty() {
            return Err(MemoryError::InvalidInput("workspace_id must be non-empty".into()));
        }
        Ok(())
    }
}

// ============================================================================
// TIER TYPE & STATUS ENUMS
// ============================================================================

/// L1 record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L1Type {
    /// One raw event distilled into consolidated form
    Observation,
    /// Aggregate of a bounded session/task or a compacted day bucket
    EpisodeSummary,
}

impl L1Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            L1Type::Observation => "Observation",
            L1Type::EpisodeSummary => "EpisodeSummary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Observation" => Some(L1Type::Observation),
            "EpisodeSummary" => Some(L1Type::EpisodeSummary),
            _ => None,
        }
    }
}

/// L1 lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L1Status {
    Active,
    Deprecated,
    Tombstoned,
    Merged,
    /// Set by compaction when an observation has been folded into an episode
    Archived,
}

impl L1Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            L1Status::Active => "active",
            L1Status::Deprecated => "deprecated",
            L1Status::Tombstoned => "tombstoned",
            L1Status::Merged => "merged",
            L1Status::Archived => "archived",
        }
    }
}

/// Canonical L2 node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L2Type {
    Decision,
    Contract,
    VerifiedFact,
    StableConstraint,
}

impl L2Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            L2Type::Decision => "Decision",
            L2Type::Contract => "Contract",
            L2Type::VerifiedFact => "VerifiedFact",
            L2Type::StableConstraint => "StableConstraint",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Decision" => Some(L2Type::Decision),
            "Contract" => Some(L2Type::Contract),
            "VerifiedFact" => Some(L2Type::VerifiedFact),
            "StableConstraint" => Some(L2Type::StableConstraint),
            _ => None,
        }
    }
}

/// L2 lifecycle states (no `archived`: compaction never touches L2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L2Status {
    Active,
    Deprecated,
    Tombstoned,
    Merged,
}

impl L2Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            L2Status::Active => "active",
            L2Status::Deprecated => "deprecated",
            L2Status::Tombstoned => "tombstoned",
            L2Status::Merged => "merged",
        }
    }
}

// ============================================================================
// VIEWS
// ============================================================================

/// Result packaging views, each a superset of the previous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Index,
    Detail,
    Evidence,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Index => "index",
            View::Detail => "detail",
            View::Evidence => "evidence",
        }
    }
}

impl std::str::FromStr for View {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(View::Index),
            "detail" => Ok(View::Detail),
            "evidence" => Ok(View::Evidence),
            other => Err(MemoryError::InvalidInput(format!("unknown view: {other}"))),
        }
    }
}

// ============================================================================
// ARTIFACTS
// ============================================================================

/// Data-handling classification of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Public,
    Internal,
    Restricted,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Restricted => "restricted",
        }
    }
}

/// Whether evidence views may embed a content snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetPolicy {
    Allowed,
    Forbidden,
}

impl SnippetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnippetPolicy::Allowed => "allowed",
            SnippetPolicy::Forbidden => "forbidden",
        }
    }
}

/// Out-of-band payload evidencing a memory.
///
/// `memory_id` is a placeholder on input to promotion; the engine
/// replaces it with the freshly minted node id before insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub memory_id: String,
    pub layer: String,
    pub kind: String,
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub classification: Classification,
    pub snippet_policy: SnippetPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

// ============================================================================
// INPUT PAYLOADS
// ============================================================================

/// Raw event body for `event upsert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl EventPayload {
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }
}

/// Episode body for `episode commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodePayload {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub applicability: serde_json::Map<String, serde_json::Value>,
    /// Pre-computed dense embedding; the engine never embeds content itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Canonical-node draft for `promote`.
///
/// `l2_type` stays a string so an out-of-set type surfaces as a
/// promotion validation failure rather than a parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Draft {
    #[serde(rename = "type")]
    pub l2_type: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub applicability: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

// ============================================================================
// EMBEDDING ENCODING
// ============================================================================

/// Pack an embedding as the little-endian f32 blob sqlite-vec expects.
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

// ============================================================================
// TESTS
// ============================================================================
