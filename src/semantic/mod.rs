//! Derived Semantic Index
//!
//! A vector table over the embeddable subset of graph nodes, used only to
//! seed retrieval. The table is derived state: it can always be deleted and
//! rebuilt from the graph store, which stays authoritative.
//!
//! The embedding text format is stable; changing it invalidates the index.
//! Search is an exact scan with squared-L2 distance, ties broken by node id,
//! so identical queries always return identical seed lists.
//!
//! @module semantic

pub mod embedder;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{Error, Result};
use crate::graph::{Node, NodeKind};
use crate::store::GraphStore;

pub use embedder::{Embedder, FastEmbedder, HashEmbedder};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Embedding requests are issued in fixed-size batches.
pub const EMBED_BATCH: usize = 32;

/// Dimension used when the embedder cannot report one.
pub const DEFAULT_DIMENSION: usize = 384;

/// Distance metric recorded in the meta table.
const METRIC: &str = "l2";

/// File holding the vector table inside the index directory.
const VECTOR_DB: &str = "vectors.db";

// =============================================================================
// TYPES
// =============================================================================

/// A semantic-search result: an entry point into graph expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub qualname: String,
    pub module_path: String,
    /// Opaque non-negative distance; smaller is closer
    pub distance: f32,
    pub rank: usize,
}

// =============================================================================
// EMBEDDING TEXT
// =============================================================================

/// The fixed-format text a node is embedded under.
pub fn embedding_text(node: &Node) -> String {
    format!(
        "KIND: {}\nNAME: {}\nQUALNAME: {}\nMODULE: {}\nLINE: {}\nDOCSTRING:\n{}",
        node.kind.as_str(),
        node.name,
        node.qualname,
        node.module_path,
        node.lineno.unwrap_or(0),
        node.docstring.as_deref().unwrap_or("")
    )
}

// =============================================================================
// SEMANTIC INDEX
// =============================================================================

/// The vector table, stored in its own SQLite file under the index
/// directory.
#[derive(Debug)]
pub struct SemanticIndex {
    conn: Connection,
    table: String,
    path: PathBuf,
}

impl SemanticIndex {
    /// Open (creating if necessary) the vector table.
    pub fn open(index_dir: impl AsRef<Path>, table_name: &str) -> Result<Self> {
        validate_table_name(table_name)?;
        let index_dir = index_dir.as_ref();
        std::fs::create_dir_all(index_dir)?;
        let path = index_dir.join(VECTOR_DB);
        let conn = Connection::open(&path)?;

        let index = Self {
            conn,
            table: table_name.to_string(),
            path,
        };
        index.ensure_schema()?;
        Ok(index)
    }

    /// Open the vector table for querying without creating anything on
    /// disk. `None` when the index was never built.
    pub fn open_readonly(index_dir: impl AsRef<Path>, table_name: &str) -> Result<Option<Self>> {
        validate_table_name(table_name)?;
        let path = index_dir.as_ref().join(VECTOR_DB);
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Some(Self {
            conn,
            table: table_name.to_string(),
            path,
        }))
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 id          TEXT PRIMARY KEY,
                 kind        TEXT NOT NULL,
                 name        TEXT NOT NULL,
                 qualname    TEXT NOT NULL,
                 module_path TEXT NOT NULL,
                 vector      BLOB NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {table}_meta (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
            table = self.table
        ))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count > 0)
    }

    /// Number of indexed rows.
    pub fn row_count(&self) -> Result<u64> {
        if !self.table_exists(&self.table)? {
            return Ok(0);
        }
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// The dimension recorded at build time, if the index was ever built.
    pub fn dimension(&self) -> Result<Option<usize>> {
        if !self.table_exists(&format!("{}_meta", self.table))? {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT value FROM {}_meta WHERE key = 'dimension'",
            self.table
        ))?;
        let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(value) => Ok(value?.parse::<usize>().ok()),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // BUILD
    // -------------------------------------------------------------------------

    /// (Re)build the vector table from the graph store.
    ///
    /// Enumerates embeddable nodes in id order and embeds them in fixed
    /// batches, upserting by node id. With `wipe` the table is dropped and
    /// recreated for the embedder's dimension; without it, the existing
    /// dimension must match.
    pub fn build(&mut self, store: &GraphStore, embedder: &dyn Embedder, wipe: bool) -> Result<u64> {
        let dim = embedder.dimension().unwrap_or(DEFAULT_DIMENSION);

        if wipe {
            self.conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {table}; DROP TABLE IF EXISTS {table}_meta;",
                table = self.table
            ))?;
            self.ensure_schema()?;
        } else if let Some(existing) = self.dimension()? {
            if existing != dim {
                return Err(Error::index(format!(
                    "vector dimension mismatch: index has {existing}, embedder reports {dim}; rebuild with wipe"
                )));
            }
        }

        self.conn.execute(
            &format!(
                "INSERT INTO {}_meta (key, value) VALUES ('dimension', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.table
            ),
            params![dim.to_string()],
        )?;
        self.conn.execute(
            &format!(
                "INSERT INTO {}_meta (key, value) VALUES ('metric', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.table
            ),
            params![METRIC],
        )?;

        let nodes = store.query_nodes(Some(&NodeKind::DEFINITIONS[..]), None)?;
        let mut indexed = 0u64;

        for batch in nodes.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(embedding_text).collect();
            let vectors = embedder.embed_texts(&texts)?;
            if vectors.len() != batch.len() {
                return Err(Error::index(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} (id, kind, name, qualname, module_path, vector)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         kind = excluded.kind,
                         name = excluded.name,
                         qualname = excluded.qualname,
                         module_path = excluded.module_path,
                         vector = excluded.vector",
                    self.table
                ))?;
                for (node, vector) in batch.iter().zip(&vectors) {
                    if vector.len() != dim {
                        return Err(Error::index(format!(
                            "embedder returned a {}-dim vector, expected {dim}",
                            vector.len()
                        )));
                    }
                    stmt.execute(params![
                        node.id,
                        node.kind,
                        node.name,
                        node.qualname,
                        node.module_path,
                        vector_to_blob(vector),
                    ])?;
                }
            }
            tx.commit()?;
            indexed += batch.len() as u64;
            debug!(indexed, total = nodes.len(), "Indexed batch");
        }

        info!(
            path = %self.path.display(),
            rows = indexed,
            dim,
            "Built semantic index"
        );
        Ok(indexed)
    }

    // -------------------------------------------------------------------------
    // SEARCH
    // -------------------------------------------------------------------------

    /// k-nearest-neighbor lookup over the vector table.
    ///
    /// Returns up to `k` seeds ordered by increasing distance, ties broken
    /// by id, ranks assigned 0..k-1.
    pub fn search(&self, embedder: &dyn Embedder, query: &str, k: usize) -> Result<Vec<Seed>> {
        if k == 0 || self.row_count()? == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embedder.embed_query(query)?;
        if let Some(dim) = self.dimension()? {
            if query_vec.len() != dim {
                return Err(Error::index(format!(
                    "query vector has dimension {}, index has {dim}",
                    query_vec.len()
                )));
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, kind, name, qualname, module_path, vector FROM {} ORDER BY id",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, NodeKind>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        let mut scored: Vec<Seed> = Vec::new();
        for row in rows {
            let (id, kind, name, qualname, module_path, blob) = row?;
            let vector = blob_to_vector(&blob);
            if vector.len() != query_vec.len() {
                continue;
            }
            scored.push(Seed {
                distance: squared_l2(&query_vec, &vector),
                rank: 0,
                id,
                kind,
                name,
                qualname,
                module_path,
            });
        }

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        for (rank, seed) in scored.iter_mut().enumerate() {
            seed.rank = rank;
        }
        Ok(scored)
    }
}

// =============================================================================
// VECTOR ENCODING
// =============================================================================

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Table names are interpolated into SQL; restrict them accordingly.
fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::index(format!("invalid table name '{name}'")))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, RelKind};
    use crate::store::GraphStore;
    use tempfile::TempDir;

    fn store_with_nodes(dir: &TempDir) -> GraphStore {
        let mut store = GraphStore::open(dir.path().join("graph.db")).unwrap();
        let nodes = vec![
            Node::new(NodeKind::Module, "pkg/db.py", "pkg.db"),
            Node::new(NodeKind::Class, "pkg/db.py", "DatabaseManager").with_span(1, 9),
            Node::new(NodeKind::Method, "pkg/db.py", "DatabaseManager.connect")
                .with_span(2, 4)
                .with_docstring(Some("Open a database connection.".to_string())),
            Node::new(NodeKind::Function, "pkg/use.py", "main").with_span(3, 5),
            Node::symbol("os"),
        ];
        let edges = vec![Edge::new(
            "cls:pkg/db.py:DatabaseManager",
            RelKind::Contains,
            "m:pkg/db.py:DatabaseManager.connect",
        )];
        store.write(&nodes, &edges, true).unwrap();
        store
    }

    #[test]
    fn test_embedding_text_format() {
        let node = Node::new(NodeKind::Method, "pkg/db.py", "DatabaseManager.connect")
            .with_span(2, 4)
            .with_docstring(Some("Open a database connection.".to_string()));
        assert_eq!(
            embedding_text(&node),
            "KIND: method\nNAME: connect\nQUALNAME: DatabaseManager.connect\nMODULE: pkg/db.py\nLINE: 2\nDOCSTRING:\nOpen a database connection."
        );
    }

    #[test]
    fn test_embedding_text_missing_fields() {
        let node = Node::new(NodeKind::Module, "pkg/db.py", "pkg.db");
        assert!(embedding_text(&node).ends_with("LINE: 0\nDOCSTRING:\n"));
    }

    #[test]
    fn test_build_skips_symbols() {
        let dir = TempDir::new().unwrap();
        let store = store_with_nodes(&dir);
        let mut index = SemanticIndex::open(dir.path().join("index"), "nodes").unwrap();

        let embedder = HashEmbedder::default();
        let indexed = index.build(&store, &embedder, true).unwrap();
        assert_eq!(indexed, 4); // everything except sym:os
        assert_eq!(index.row_count().unwrap(), 4);
        assert_eq!(index.dimension().unwrap(), Some(64));
    }

    #[test]
    fn test_search_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let store = store_with_nodes(&dir);
        let mut index = SemanticIndex::open(dir.path().join("index"), "nodes").unwrap();
        let embedder = HashEmbedder::default();
        index.build(&store, &embedder, true).unwrap();

        let seeds = index.search(&embedder, "database connection", 4).unwrap();
        assert_eq!(seeds.len(), 4);
        assert_eq!(seeds[0].id, "m:pkg/db.py:DatabaseManager.connect");
        for (i, seed) in seeds.iter().enumerate() {
            assert_eq!(seed.rank, i);
        }
        for pair in seeds.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_search_k_zero_and_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_with_nodes(&dir);
        let mut index = SemanticIndex::open(dir.path().join("index"), "nodes").unwrap();
        let embedder = HashEmbedder::default();

        // Never built: empty result, no error.
        assert!(index.search(&embedder, "anything", 5).unwrap().is_empty());

        index.build(&store, &embedder, true).unwrap();
        assert!(index.search(&embedder, "anything", 0).unwrap().is_empty());

        // k larger than the table just returns everything.
        assert_eq!(index.search(&embedder, "anything", 100).unwrap().len(), 4);
    }

    #[test]
    fn test_search_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = store_with_nodes(&dir);
        let mut index = SemanticIndex::open(dir.path().join("index"), "nodes").unwrap();
        let embedder = HashEmbedder::default();
        index.build(&store, &embedder, true).unwrap();

        let a = index.search(&embedder, "connect", 3).unwrap();
        let b = index.search(&embedder, "connect", 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_mismatch_without_wipe() {
        let dir = TempDir::new().unwrap();
        let store = store_with_nodes(&dir);
        let mut index = SemanticIndex::open(dir.path().join("index"), "nodes").unwrap();
        index.build(&store, &HashEmbedder::new(16), true).unwrap();

        let err = index
            .build(&store, &HashEmbedder::new(32), false)
            .unwrap_err();
        assert!(matches!(err, Error::Index { .. }));

        // Wipe recreates for the new dimension.
        index.build(&store, &HashEmbedder::new(32), true).unwrap();
        assert_eq!(index.dimension().unwrap(), Some(32));
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = SemanticIndex::open(dir.path().join("index"), "bad-name; --").unwrap_err();
        assert!(matches!(err, Error::Index { .. }));
    }

    #[test]
    fn test_vector_blob_round_trip() {
        let vector = vec![0.5f32, -1.25, 3.0];
        assert_eq!(blob_to_vector(&vector_to_blob(&vector)), vector);
    }
}
