//! Hybrid Query Types and Ranking
//!
//! Parameter validation, the serializable query result, and the composite
//! ranking key. Every sort key ends in the node id, so the returned order
//! is a strict total order and identical queries return identical results.
//!
//! @module engine/query

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::graph::{Edge, Node, RelKind};

// =============================================================================
// PARAMETERS
// =============================================================================

/// Parameters of a hybrid query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Natural-language query text
    pub q: String,
    /// Number of semantic seeds
    pub k: usize,
    /// Expansion bound in edges
    pub hop: usize,
    /// Relations the expansion may traverse
    pub rels: BTreeSet<RelKind>,
    /// Keep symbol-kind nodes in the result
    pub include_symbols: bool,
}

impl QueryParams {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    /// Reject invalid parameters before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.q.trim().is_empty() {
            return Err(Error::query("query text is empty"));
        }
        if self.rels.is_empty() {
            return Err(Error::query("no relations selected"));
        }
        Ok(())
    }
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            q: String::new(),
            k: 8,
            hop: 1,
            rels: RelKind::ALL.into_iter().collect(),
            include_symbols: false,
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// A node in a query result, carrying its expansion provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    #[serde(flatten)]
    pub node: Node,
    /// Minimum hop count from any seed
    pub best_hop: usize,
    /// Seed that reached this node first (lexicographic tie-break)
    pub via_seed: String,
    /// Distance of `via_seed` in the semantic search
    pub seed_distance: f32,
}

/// The structured result of a hybrid query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub seeds_count: usize,
    pub expanded_count: usize,
    pub returned_nodes: usize,
    pub hop: usize,
    pub rels: Vec<RelKind>,
    pub nodes: Vec<RankedNode>,
    /// Every stored edge between two returned nodes
    pub edges: Vec<Edge>,
}

// =============================================================================
// RANKING
// =============================================================================

/// Sort by (best_hop, seed distance, kind priority, id).
pub(crate) fn rank_nodes(nodes: &mut [RankedNode]) {
    nodes.sort_by(|a, b| {
        a.best_hop
            .cmp(&b.best_hop)
            .then_with(|| a.seed_distance.total_cmp(&b.seed_distance))
            .then_with(|| a.node.kind.priority().cmp(&b.node.kind.priority()))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
}

// =============================================================================
// TESTS
// =============================================================================
