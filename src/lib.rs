//! CodeKG - Deterministic code knowledge graph for Python repositories
//!
//! CodeKG parses a Python source tree into a canonical graph of modules,
//! classes, functions, methods, and unresolved symbols, persists it in a
//! single SQLite file, derives a vector index over it, and answers hybrid
//! natural-language + structural queries with source-grounded snippets.
//! Everything is deterministic: the same repository always produces the
//! same graph, and the same query always returns the same result.

pub mod cli;
pub mod core;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod semantic;
pub mod store;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use engine::{BuildStats, CodeKg, PackParams, QueryParams, QueryResult, SnippetPack};
pub use graph::{Edge, Evidence, Node, NodeKind, RelKind};
pub use semantic::{Embedder, FastEmbedder, HashEmbedder, Seed};
pub use store::{GraphStore, Provenance, StoreStats};
