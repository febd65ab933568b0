//! Canonical Graph Store
//!
//! SQLite-backed persistence for the node/edge graph. The store owns the
//! authoritative copy of the extraction output: writes are whole-graph
//! (wipe) or full upserts inside one immediate transaction, so a failed
//! write leaves the prior contents intact and concurrent readers never see
//! a half-written graph.
//!
//! Reads are lock-free; the single writer holds the SQLite write lock for
//! the duration of its transaction.
//!
//! @module store

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OpenFlags, ToSql, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{Error, Result};
use crate::graph::{Edge, Evidence, Node, NodeKind, RelKind};

// =============================================================================
// SQL TYPE BRIDGING
// =============================================================================

impl ToSql for NodeKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for NodeKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        NodeKind::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for RelKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for RelKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        RelKind::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS nodes (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    name        TEXT NOT NULL,
    qualname    TEXT NOT NULL,
    module_path TEXT NOT NULL,
    lineno      INTEGER,
    end_lineno  INTEGER,
    docstring   TEXT
);
CREATE TABLE IF NOT EXISTS edges (
    src      TEXT NOT NULL,
    rel      TEXT NOT NULL,
    dst      TEXT NOT NULL,
    evidence TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (src, rel, dst)
);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
CREATE INDEX IF NOT EXISTS idx_nodes_module ON nodes(module_path);
CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst);
CREATE INDEX IF NOT EXISTS idx_edges_rel ON edges(rel);
";

/// Stay under SQLite's bind-parameter limit per statement
const ID_CHUNK: usize = 500;

// =============================================================================
// TYPES
// =============================================================================

/// Provenance of a node reached by expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Minimum number of allowed-relation edges from any seed
    pub best_hop: usize,
    /// Lexicographically smallest seed achieving that minimum
    pub via_seed: String,
}

/// Store-wide counts grouped by kind and relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub node_counts: BTreeMap<String, u64>,
    pub edge_counts: BTreeMap<String, u64>,
    pub db_path: PathBuf,
}

// =============================================================================
// GRAPH STORE
// =============================================================================

/// The canonical persistent graph
#[derive(Debug)]
pub struct GraphStore {
    conn: Connection,
    path: PathBuf,
}

impl GraphStore {
    /// Open (creating if necessary) the graph file and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    /// Open an existing graph file read-only; absent file means the graph
    /// was never built.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::StoreMissing { path });
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -------------------------------------------------------------------------
    // WRITE
    // -------------------------------------------------------------------------

    /// Atomically write the extraction output.
    ///
    /// With `wipe` the store reflects exactly the submitted set afterwards;
    /// without it, the union of prior contents and submitted rows (upsert by
    /// primary key).
    pub fn write(&mut self, nodes: &[Node], edges: &[Edge], wipe: bool) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if wipe {
            tx.execute("DELETE FROM edges", [])?;
            tx.execute("DELETE FROM nodes", [])?;
        }

        {
            let mut node_stmt = tx.prepare(
                "INSERT INTO nodes (id, kind, name, qualname, module_path, lineno, end_lineno, docstring)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind,
                     name = excluded.name,
                     qualname = excluded.qualname,
                     module_path = excluded.module_path,
                     lineno = excluded.lineno,
                     end_lineno = excluded.end_lineno,
                     docstring = excluded.docstring",
            )?;
            for node in nodes {
                node_stmt.execute(params![
                    node.id,
                    node.kind,
                    node.name,
                    node.qualname,
                    node.module_path,
                    node.lineno,
                    node.end_lineno,
                    node.docstring,
                ])?;
            }

            let mut edge_stmt = tx.prepare(
                "INSERT INTO edges (src, rel, dst, evidence)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(src, rel, dst) DO UPDATE SET evidence = excluded.evidence",
            )?;
            for edge in edges {
                let evidence = serde_json::to_string(&edge.evidence)?;
                edge_stmt.execute(params![edge.src, edge.rel, edge.dst, evidence])?;
            }
        }

        tx.commit()?;
        info!(
            path = %self.path.display(),
            nodes = nodes.len(),
            edges = edges.len(),
            wipe,
            "Wrote graph store"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // READ
    // -------------------------------------------------------------------------

    /// Fetch one node by id; absence is not an error.
    pub fn node(&self, id: &str) -> Result<Option<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, name, qualname, module_path, lineno, end_lineno, docstring
             FROM nodes WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_node)?;
        match rows.next() {
            Some(node) => Ok(Some(node?)),
            None => Ok(None),
        }
    }

    /// Enumerate nodes, optionally filtered by kind set and module-path
    /// prefix, in id order.
    pub fn query_nodes(
        &self,
        kinds: Option<&[NodeKind]>,
        module_prefix: Option<&str>,
    ) -> Result<Vec<Node>> {
        let mut sql = String::from(
            "SELECT id, kind, name, qualname, module_path, lineno, end_lineno, docstring
             FROM nodes WHERE 1=1",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(kinds) = kinds {
            let placeholders = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND kind IN ({placeholders})"));
            for kind in kinds {
                args.push(Box::new(*kind));
            }
        }
        if let Some(prefix) = module_prefix {
            // substr comparison avoids LIKE-escaping of `_` in paths
            args.push(Box::new(prefix.to_string()));
            sql.push_str(&format!(
                " AND substr(module_path, 1, length(?{})) = ?{}",
                args.len(),
                args.len()
            ));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            row_to_node,
        )?;
        let mut nodes = Vec::new();
        for node in rows {
            nodes.push(node?);
        }
        Ok(nodes)
    }

    /// Every edge whose src and dst are both in the id set, in
    /// (src, rel, dst) order.
    pub fn edges_within(&self, ids: &BTreeSet<String>) -> Result<Vec<Edge>> {
        let mut edges = Vec::new();
        let id_list: Vec<&String> = ids.iter().collect();

        for chunk in id_list.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT src, rel, dst, evidence FROM edges WHERE src IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(chunk.iter()),
                row_to_edge,
            )?;
            for edge in rows {
                let edge = edge?;
                if ids.contains(&edge.dst) {
                    edges.push(edge);
                }
            }
        }

        edges.sort_by(|a, b| {
            (&a.src, a.rel.as_str(), &a.dst).cmp(&(&b.src, b.rel.as_str(), &b.dst))
        });
        Ok(edges)
    }

    /// Counts grouped by node kind and edge relation.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut node_counts = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM nodes GROUP BY kind ORDER BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, NodeKind>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            node_counts.insert(kind.as_str().to_string(), count);
        }

        let mut edge_counts = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT rel, COUNT(*) FROM edges GROUP BY rel ORDER BY rel")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, RelKind>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (rel, count) = row?;
            edge_counts.insert(rel.as_str().to_string(), count);
        }

        Ok(StoreStats {
            total_nodes: node_counts.values().sum(),
            total_edges: edge_counts.values().sum(),
            node_counts,
            edge_counts,
            db_path: self.path.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // EXPAND
    // -------------------------------------------------------------------------

    /// Bounded breadth-first expansion with provenance.
    ///
    /// Edges in the allowed relation set are traversed as undirected so
    /// callers reach callers and callees alike. Every seed is included at
    /// hop 0; each reached node records its minimum hop count and the
    /// lexicographically smallest seed achieving it.
    pub fn expand(
        &self,
        seeds: &[String],
        hops: usize,
        rels: &BTreeSet<RelKind>,
    ) -> Result<BTreeMap<String, Provenance>> {
        let mut result: BTreeMap<String, Provenance> = BTreeMap::new();
        if seeds.is_empty() || rels.is_empty() {
            for seed in seeds {
                result
                    .entry(seed.clone())
                    .or_insert_with(|| Provenance {
                        best_hop: 0,
                        via_seed: seed.clone(),
                    });
            }
            return Ok(result);
        }

        let adjacency = self.load_adjacency(rels)?;

        let mut frontier: BTreeSet<String> = BTreeSet::new();
        for seed in seeds {
            if result
                .insert(
                    seed.clone(),
                    Provenance {
                        best_hop: 0,
                        via_seed: seed.clone(),
                    },
                )
                .is_none()
            {
                frontier.insert(seed.clone());
            }
        }

        for hop in 1..=hops {
            if frontier.is_empty() {
                break;
            }
            // node -> smallest via seed among this hop's candidates
            let mut next: BTreeMap<String, String> = BTreeMap::new();
            for node in &frontier {
                let via = result[node].via_seed.clone();
                let Some(neighbors) = adjacency.get(node) else {
                    continue;
                };
                for neighbor in neighbors {
                    if result.contains_key(neighbor) {
                        continue;
                    }
                    next.entry(neighbor.clone())
                        .and_modify(|existing| {
                            if via < *existing {
                                *existing = via.clone();
                            }
                        })
                        .or_insert_with(|| via.clone());
                }
            }
            frontier.clear();
            for (node, via_seed) in next {
                result.insert(
                    node.clone(),
                    Provenance {
                        best_hop: hop,
                        via_seed,
                    },
                );
                frontier.insert(node);
            }
        }

        debug!(seeds = seeds.len(), hops, reached = result.len(), "Expanded");
        Ok(result)
    }

    /// Undirected adjacency over the allowed relations.
    fn load_adjacency(
        &self,
        rels: &BTreeSet<RelKind>,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let placeholders = vec!["?"; rels.len()].join(", ");
        let sql = format!("SELECT src, dst FROM edges WHERE rel IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(rels.iter().map(|r| r.as_str())),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in rows {
            let (src, dst) = row?;
            adjacency
                .entry(src.clone())
                .or_default()
                .insert(dst.clone());
            adjacency.entry(dst).or_default().insert(src);
        }
        Ok(adjacency)
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        qualname: row.get(3)?,
        module_path: row.get(4)?,
        lineno: row.get(5)?,
        end_lineno: row.get(6)?,
        docstring: row.get(7)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let evidence: String = row.get(3)?;
    Ok(Edge {
        src: row.get(0)?,
        rel: row.get(1)?,
        dst: row.get(2)?,
        // The store wrote this JSON itself; tolerate nothing fancier.
        evidence: serde_json::from_str::<Evidence>(&evidence).unwrap_or_default(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_id;
    use tempfile::TempDir;

    fn sample_graph() -> (Vec<Node>, Vec<Edge>) {
        let nodes = vec![
            Node::new(NodeKind::Module, "pkg/a.py", "pkg.a"),
            Node::new(NodeKind::Function, "pkg/a.py", "foo").with_span(1, 2),
            Node::new(NodeKind::Class, "pkg/a.py", "C").with_span(4, 8),
            Node::new(NodeKind::Method, "pkg/a.py", "C.m").with_span(5, 8),
            Node::symbol("os"),
        ];
        let edges = vec![
            Edge::new("mod:pkg/a.py", RelKind::Contains, "fn:pkg/a.py:foo"),
            Edge::new("mod:pkg/a.py", RelKind::Contains, "cls:pkg/a.py:C"),
            Edge::new("cls:pkg/a.py:C", RelKind::Contains, "m:pkg/a.py:C.m"),
            Edge::new("mod:pkg/a.py", RelKind::Imports, "sym:os")
                .with_evidence(Evidence::at(1, "os")),
            Edge::new("m:pkg/a.py:C.m", RelKind::Calls, "fn:pkg/a.py:foo")
                .with_evidence(Evidence::at(6, "foo()")),
        ];
        (nodes, edges)
    }

    fn open_store(dir: &TempDir) -> GraphStore {
        GraphStore::open(dir.path().join("graph.db")).unwrap()
    }

    #[test]
    fn test_write_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (nodes, edges) = sample_graph();
        store.write(&nodes, &edges, true).unwrap();

        let all = store.query_nodes(None, None).unwrap();
        assert_eq!(all.len(), nodes.len());
        for node in &nodes {
            assert_eq!(store.node(&node.id).unwrap().as_ref(), Some(node));
        }

        let ids: BTreeSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let read_edges = store.edges_within(&ids).unwrap();
        assert_eq!(read_edges.len(), edges.len());
        let call = read_edges
            .iter()
            .find(|e| e.rel == RelKind::Calls)
            .unwrap();
        assert_eq!(call.evidence.expr.as_deref(), Some("foo()"));
    }

    #[test]
    fn test_node_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.node("fn:missing.py:nope").unwrap(), None);
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = TempDir::new().unwrap();
        let err = GraphStore::open_existing(dir.path().join("graph.db")).unwrap_err();
        assert!(matches!(err, Error::StoreMissing { .. }));
    }

    #[test]
    fn test_wipe_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (nodes, edges) = sample_graph();
        store.write(&nodes, &edges, true).unwrap();

        let replacement = vec![Node::new(NodeKind::Function, "b.py", "bar")];
        store.write(&replacement, &[], true).unwrap();

        let all = store.query_nodes(None, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "fn:b.py:bar");
        assert!(store.edges_within(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_unions_without_wipe() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (nodes, edges) = sample_graph();
        store.write(&nodes, &edges, true).unwrap();

        let extra = vec![Node::new(NodeKind::Function, "b.py", "bar")];
        store.write(&extra, &[], false).unwrap();

        assert_eq!(store.query_nodes(None, None).unwrap().len(), nodes.len() + 1);

        // Re-upserting an existing node changes its columns, not its count.
        let updated = vec![Node::new(NodeKind::Function, "pkg/a.py", "foo").with_span(10, 12)];
        store.write(&updated, &[], false).unwrap();
        assert_eq!(store.query_nodes(None, None).unwrap().len(), nodes.len() + 1);
        let foo = store.node(&node_id(NodeKind::Function, "pkg/a.py", "foo")).unwrap();
        assert_eq!(foo.unwrap().lineno, Some(10));
    }

    #[test]
    fn test_query_nodes_filters() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (nodes, edges) = sample_graph();
        store.write(&nodes, &edges, true).unwrap();

        let functions = store
            .query_nodes(Some(&[NodeKind::Function, NodeKind::Method][..]), None)
            .unwrap();
        assert_eq!(functions.len(), 2);

        let in_pkg = store.query_nodes(None, Some("pkg/")).unwrap();
        assert_eq!(in_pkg.len(), 4); // symbol has empty module_path

        // Results come back in id order.
        let ids: Vec<&str> = in_pkg.iter().map(|n| n.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_stats_counts() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let (nodes, edges) = sample_graph();
        store.write(&nodes, &edges, true).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_nodes, 5);
        assert_eq!(stats.total_edges, 5);
        assert_eq!(stats.node_counts["module"], 1);
        assert_eq!(stats.node_counts["symbol"], 1);
        assert_eq!(stats.edge_counts["CONTAINS"], 3);
        assert_eq!(stats.edge_counts["CALLS"], 1);
    }

    fn chain_store(dir: &TempDir) -> GraphStore {
        // a -CALLS-> b -CALLS-> c -CALLS-> d, plus a -IMPORTS-> x
        let mut store = open_store(dir);
        let nodes: Vec<Node> = ["a", "b", "c", "d", "x"]
            .iter()
            .map(|n| Node::new(NodeKind::Function, "m.py", n))
            .collect();
        let edges = vec![
            Edge::new("fn:m.py:a", RelKind::Calls, "fn:m.py:b"),
            Edge::new("fn:m.py:b", RelKind::Calls, "fn:m.py:c"),
            Edge::new("fn:m.py:c", RelKind::Calls, "fn:m.py:d"),
            Edge::new("fn:m.py:a", RelKind::Imports, "fn:m.py:x"),
        ];
        store.write(&nodes, &edges, true).unwrap();
        store
    }

    fn rels(list: &[RelKind]) -> BTreeSet<RelKind> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_expand_hop_zero_returns_seeds() {
        let dir = TempDir::new().unwrap();
        let store = chain_store(&dir);

        let out = store
            .expand(&["fn:m.py:b".to_string()], 0, &rels(&RelKind::ALL))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["fn:m.py:b"].best_hop, 0);
        assert_eq!(out["fn:m.py:b"].via_seed, "fn:m.py:b");
    }

    #[test]
    fn test_expand_counts_minimum_hops() {
        let dir = TempDir::new().unwrap();
        let store = chain_store(&dir);

        let out = store
            .expand(&["fn:m.py:a".to_string()], 2, &rels(&[RelKind::Calls]))
            .unwrap();
        assert_eq!(out["fn:m.py:a"].best_hop, 0);
        assert_eq!(out["fn:m.py:b"].best_hop, 1);
        assert_eq!(out["fn:m.py:c"].best_hop, 2);
        assert!(!out.contains_key("fn:m.py:d")); // beyond the bound
        assert!(!out.contains_key("fn:m.py:x")); // relation not allowed
    }

    #[test]
    fn test_expand_is_undirected() {
        let dir = TempDir::new().unwrap();
        let store = chain_store(&dir);

        // Seeding at d walks the CALLS edges backwards.
        let out = store
            .expand(&["fn:m.py:d".to_string()], 1, &rels(&[RelKind::Calls]))
            .unwrap();
        assert_eq!(out["fn:m.py:c"].best_hop, 1);
    }

    #[test]
    fn test_expand_via_seed_tiebreak() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        // Both seeds are one hop from target.
        let nodes: Vec<Node> = ["s1", "s2", "t"]
            .iter()
            .map(|n| Node::new(NodeKind::Function, "m.py", n))
            .collect();
        let edges = vec![
            Edge::new("fn:m.py:s1", RelKind::Calls, "fn:m.py:t"),
            Edge::new("fn:m.py:s2", RelKind::Calls, "fn:m.py:t"),
        ];
        store.write(&nodes, &edges, true).unwrap();

        let out = store
            .expand(
                &["fn:m.py:s2".to_string(), "fn:m.py:s1".to_string()],
                1,
                &rels(&[RelKind::Calls]),
            )
            .unwrap();
        assert_eq!(out["fn:m.py:t"].best_hop, 1);
        assert_eq!(out["fn:m.py:t"].via_seed, "fn:m.py:s1");
    }

    #[test]
    fn test_expand_cycle_safe() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let nodes: Vec<Node> = ["a", "b"]
            .iter()
            .map(|n| Node::new(NodeKind::Function, "m.py", n))
            .collect();
        let edges = vec![
            Edge::new("fn:m.py:a", RelKind::Calls, "fn:m.py:b"),
            Edge::new("fn:m.py:b", RelKind::Calls, "fn:m.py:a"),
        ];
        store.write(&nodes, &edges, true).unwrap();

        let out = store
            .expand(&["fn:m.py:a".to_string()], 10, &rels(&[RelKind::Calls]))
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["fn:m.py:b"].best_hop, 1);
    }

    #[test]
    fn test_build_idempotence_by_rows() {
        let dir = TempDir::new().unwrap();
        let (nodes, edges) = sample_graph();

        let mut store = open_store(&dir);
        store.write(&nodes, &edges, true).unwrap();
        let first = store.query_nodes(None, None).unwrap();

        store.write(&nodes, &edges, true).unwrap();
        let second = store.query_nodes(None, None).unwrap();
        assert_eq!(first, second);
    }
}
