//! Orchestrator
//!
//! `CodeKg` coordinates the build pipeline (extract -> store -> index) and
//! the hybrid query path (semantic seeding -> bounded structural expansion ->
//! rank -> dedupe -> snippet). It owns the configuration and a lazily
//! constructed embedder; store and index handles are opened per operation,
//! so any number of queries can run concurrently against a finished build.
//!
//! @module engine

pub mod pack;
pub mod query;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::Config;
use crate::core::error::Result;
use crate::extract::extract_repo;
use crate::graph::Node;
use crate::semantic::{Embedder, FastEmbedder, SemanticIndex};
use crate::store::{GraphStore, StoreStats};

pub use pack::{PackParams, PackedSnippet, Snippet, SnippetPack};
pub use query::{QueryParams, QueryResult, RankedNode};

// =============================================================================
// BUILD STATS
// =============================================================================

/// Summary of a build: what was extracted, stored, and indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub repo_root: PathBuf,
    pub db_path: PathBuf,
    /// `.py` files successfully extracted (zero for index-only builds)
    pub files: usize,
    /// Non-fatal extraction warnings
    pub warnings: usize,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub node_counts: BTreeMap<String, u64>,
    pub edge_counts: BTreeMap<String, u64>,
    /// Rows in the vector table (zero for graph-only builds)
    pub indexed: u64,
    /// Vector dimension (zero for graph-only builds)
    pub dimension: usize,
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// The indexing and retrieval engine over one repository
pub struct CodeKg {
    config: Config,
    embedder: OnceCell<Box<dyn Embedder>>,
}

impl CodeKg {
    /// Create an engine that lazily loads the configured embedding model on
    /// first use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            embedder: OnceCell::new(),
        }
    }

    /// Create an engine with an injected embedder (tests, custom backends).
    pub fn with_embedder(config: Config, embedder: Box<dyn Embedder>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(embedder);
        Self {
            config,
            embedder: cell,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn embedder(&self) -> Result<&dyn Embedder> {
        let embedder = self.embedder.get_or_try_init(|| {
            Ok::<_, crate::core::error::Error>(Box::new(FastEmbedder::new(
                &self.config.model_name,
            )?) as Box<dyn Embedder>)
        })?;
        Ok(embedder.as_ref())
    }

    // -------------------------------------------------------------------------
    // BUILD PIPELINE
    // -------------------------------------------------------------------------

    /// Full build: extract the repository, write the graph store, rebuild
    /// the semantic index.
    pub fn build(&self, wipe: bool) -> Result<BuildStats> {
        let extraction = extract_repo(&self.config.repo_root)?;
        let mut store = GraphStore::open(&self.config.db_path)?;
        store.write(&extraction.nodes, &extraction.edges, wipe)?;

        let mut index = SemanticIndex::open(&self.config.index_dir, &self.config.table_name)?;
        let indexed = index.build(&store, self.embedder()?, wipe)?;
        let dimension = index.dimension()?.unwrap_or(0);

        self.build_stats(&store, extraction.files, extraction.warnings, indexed, dimension)
    }

    /// Extract and store only; the index keeps whatever it had.
    pub fn build_graph(&self, wipe: bool) -> Result<BuildStats> {
        let extraction = extract_repo(&self.config.repo_root)?;
        let mut store = GraphStore::open(&self.config.db_path)?;
        store.write(&extraction.nodes, &extraction.edges, wipe)?;
        self.build_stats(&store, extraction.files, extraction.warnings, 0, 0)
    }

    /// Rebuild the semantic index from an already-populated store.
    pub fn build_index(&self, wipe: bool) -> Result<BuildStats> {
        let store = GraphStore::open_existing(&self.config.db_path)?;
        let mut index = SemanticIndex::open(&self.config.index_dir, &self.config.table_name)?;
        let indexed = index.build(&store, self.embedder()?, wipe)?;
        let dimension = index.dimension()?.unwrap_or(0);
        self.build_stats(&store, 0, 0, indexed, dimension)
    }

    fn build_stats(
        &self,
        store: &GraphStore,
        files: usize,
        warnings: usize,
        indexed: u64,
        dimension: usize,
    ) -> Result<BuildStats> {
        let stats = store.stats()?;
        info!(
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            indexed,
            "Build complete"
        );
        Ok(BuildStats {
            repo_root: self.config.repo_root.clone(),
            db_path: self.config.db_path.clone(),
            files,
            warnings,
            total_nodes: stats.total_nodes,
            total_edges: stats.total_edges,
            node_counts: stats.node_counts,
            edge_counts: stats.edge_counts,
            indexed,
            dimension,
        })
    }

    // -------------------------------------------------------------------------
    // QUERY
    // -------------------------------------------------------------------------

    /// Two-phase hybrid query: semantic seeds, then bounded expansion over
    /// the graph, ranked deterministically.
    pub fn query(&self, params: &QueryParams) -> Result<QueryResult> {
        params.validate()?;
        let store = GraphStore::open_existing(&self.config.db_path)?;

        let seeds = if params.k == 0 {
            Vec::new()
        } else {
            match SemanticIndex::open_readonly(&self.config.index_dir, &self.config.table_name)? {
                Some(index) if index.row_count()? > 0 => {
                    index.search(self.embedder()?, &params.q, params.k)?
                }
                _ => Vec::new(),
            }
        };

        let seed_ids: Vec<String> = seeds.iter().map(|s| s.id.clone()).collect();
        let meta = store.expand(&seed_ids, params.hop, &params.rels)?;

        let distances: HashMap<&str, f32> =
            seeds.iter().map(|s| (s.id.as_str(), s.distance)).collect();

        let mut nodes = Vec::new();
        for (id, provenance) in &meta {
            let Some(node) = store.node(id)? else {
                continue;
            };
            if node.kind == crate::graph::NodeKind::Symbol && !params.include_symbols {
                continue;
            }
            let seed_distance = distances
                .get(provenance.via_seed.as_str())
                .copied()
                .unwrap_or(f32::MAX);
            nodes.push(RankedNode {
                node,
                best_hop: provenance.best_hop,
                via_seed: provenance.via_seed.clone(),
                seed_distance,
            });
        }
        query::rank_nodes(&mut nodes);

        let returned_ids: BTreeSet<String> = nodes.iter().map(|n| n.node.id.clone()).collect();
        let edges = store.edges_within(&returned_ids)?;

        Ok(QueryResult {
            query: params.q.clone(),
            seeds_count: seeds.len(),
            expanded_count: meta.len(),
            returned_nodes: nodes.len(),
            hop: params.hop,
            rels: params.rels.iter().copied().collect(),
            nodes,
            edges,
        })
    }

    /// Query plus source-grounded snippet extraction.
    pub fn pack(&self, params: &PackParams) -> Result<SnippetPack> {
        let result = self.query(&params.query)?;
        Ok(pack::build_pack(&self.config.repo_root, result, params))
    }

    // -------------------------------------------------------------------------
    // LOOKUPS
    // -------------------------------------------------------------------------

    /// Store-wide counts.
    pub fn stats(&self) -> Result<StoreStats> {
        GraphStore::open_existing(&self.config.db_path)?.stats()
    }

    /// Fetch one node by id; absence is `None`, not an error.
    pub fn node(&self, id: &str) -> Result<Option<Node>> {
        GraphStore::open_existing(&self.config.db_path)?.node(id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
