//! Snippet Pack
//!
//! Turns a query result into source-grounded snippets: span computation
//! around each definition, per-file span deduplication, per-file and global
//! caps, and line-numbered extraction. File contents are read lazily and
//! cached for the duration of one pack invocation only.
//!
//! Any path that would resolve outside the repository root is dropped and
//! logged, never read.
//!
//! @module engine/pack

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::query::{QueryParams, QueryResult};
use crate::graph::{Node, NodeKind};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Fallback window at the top of a file for modules and nodes without line
/// info.
pub const TOP_WINDOW: u32 = 30;

/// Two spans within this many blank lines of each other collapse into one.
const DEDUPE_GAP: u32 = 2;

// =============================================================================
// PARAMETERS
// =============================================================================

/// Parameters of a snippet pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackParams {
    pub query: QueryParams,
    /// Context lines around each definition
    pub context: u32,
    /// Hard cap on any single snippet's height
    pub max_lines: u32,
    /// Global cap on retained snippets
    pub max_nodes: usize,
    /// Cap on snippets retained per source file
    pub per_file_cap: usize,
}

impl PackParams {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            query: QueryParams::new(q),
            ..Self::default()
        }
    }
}

impl Default for PackParams {
    fn default() -> Self {
        Self {
            query: QueryParams::default(),
            context: 5,
            max_lines: 60,
            max_nodes: 15,
            per_file_cap: 3,
        }
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// A line-numbered extract from one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub path: String,
    /// Closed 1-based line range
    pub start: u32,
    pub end: u32,
    /// The extract, one `NN: <line>` row per line
    pub text: String,
}

/// A retained node with its snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedSnippet {
    pub id: String,
    pub kind: NodeKind,
    pub module_path: String,
    pub snippet: Snippet,
}

/// A query result extended with source-grounded snippets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetPack {
    #[serde(flatten)]
    pub result: QueryResult,
    pub snippets: Vec<PackedSnippet>,
}

impl SnippetPack {
    /// Line-numbered markdown: one section per retained node.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for entry in &self.snippets {
            let _ = writeln!(
                out,
                "## {} [{}] {}:{}-{}",
                entry.id,
                entry.kind.as_str(),
                entry.snippet.path,
                entry.snippet.start,
                entry.snippet.end
            );
            out.push_str("```python\n");
            out.push_str(&entry.snippet.text);
            out.push_str("\n```\n\n");
        }
        out
    }
}

// =============================================================================
// PACK CONSTRUCTION
// =============================================================================

/// Attach snippets to a query result, walking nodes in rank order.
pub(crate) fn build_pack(
    repo_root: &Path,
    result: QueryResult,
    params: &PackParams,
) -> SnippetPack {
    let mut cache = FileCache::new(repo_root);
    let mut kept_spans: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
    let mut per_file: HashMap<String, usize> = HashMap::new();
    let mut snippets = Vec::new();

    for ranked in &result.nodes {
        if snippets.len() >= params.max_nodes {
            break;
        }
        let node = &ranked.node;
        if node.module_path.is_empty() {
            // Unresolved externals have no source to show.
            continue;
        }

        let Some(lines) = cache.lines(&node.module_path) else {
            continue;
        };
        let file_len = lines.len() as u32;
        let Some((start, end)) = span_for(node, params, file_len) else {
            warn!(id = %node.id, "Definition lies beyond current file contents, dropping");
            continue;
        };

        let file_spans = kept_spans.entry(node.module_path.clone()).or_default();
        if file_spans.iter().any(|&s| spans_conflict(s, (start, end))) {
            continue;
        }
        let count = per_file.entry(node.module_path.clone()).or_insert(0);
        if *count >= params.per_file_cap {
            continue;
        }

        let text = numbered_extract(lines, start, end);
        file_spans.push((start, end));
        *count += 1;
        snippets.push(PackedSnippet {
            id: node.id.clone(),
            kind: node.kind,
            module_path: node.module_path.clone(),
            snippet: Snippet {
                path: node.module_path.clone(),
                start,
                end,
                text,
            },
        });
    }

    SnippetPack { result, snippets }
}

/// The span to extract for a node, clamped to the file and to `max_lines`.
///
/// Returns `None` when the recorded location lies past the end of the file
/// (stale after a source edit).
fn span_for(node: &Node, params: &PackParams, file_len: u32) -> Option<(u32, u32)> {
    if file_len == 0 {
        return None;
    }
    let max_lines = params.max_lines.max(1);

    let located = match (node.kind, node.lineno, node.end_lineno) {
        (NodeKind::Module, _, _) => None,
        (_, Some(lineno), Some(end_lineno)) if lineno > 0 && end_lineno > 0 => {
            Some((lineno, end_lineno))
        }
        _ => None,
    };

    let (start, end) = match located {
        None => (1, max_lines.min(TOP_WINDOW)),
        Some((lineno, end_lineno)) => {
            if lineno > file_len {
                return None;
            }
            let start = lineno.saturating_sub(params.context).max(1);
            let end = (end_lineno.saturating_add(params.context))
                .min(lineno.saturating_sub(1).saturating_add(max_lines));
            (start, end)
        }
    };

    // The snippet never exceeds max_lines or the file itself.
    let end = end.min(start + max_lines - 1).min(file_len);
    Some((start, end.max(start)))
}

/// Spans in the same file conflict when they overlap or sit within the
/// dedupe gap of each other.
fn spans_conflict(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1.saturating_add(DEDUPE_GAP + 1) && b.0 <= a.1.saturating_add(DEDUPE_GAP + 1)
}

/// Extract `[start, end]` with line numbers zero-padded to the width of the
/// file's largest line number.
fn numbered_extract(lines: &[String], start: u32, end: u32) -> String {
    let width = lines.len().to_string().len();
    let mut out = String::new();
    for ln in start..=end.min(lines.len() as u32) {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{:0width$}: {}", ln, lines[ln as usize - 1]);
    }
    out
}

// =============================================================================
// FILE CACHE
// =============================================================================

/// Per-invocation source cache with a path-traversal guard.
struct FileCache {
    repo_root: PathBuf,
    files: HashMap<String, Option<Vec<String>>>,
}

impl FileCache {
    fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            files: HashMap::new(),
        }
    }

    fn lines(&mut self, module_path: &str) -> Option<&Vec<String>> {
        if !self.files.contains_key(module_path) {
            let loaded = self.load(module_path);
            self.files.insert(module_path.to_string(), loaded);
        }
        self.files.get(module_path).and_then(|slot| slot.as_ref())
    }

    /// Resolve and read a module path, rejecting anything that resolves
    /// outside the repository root.
    fn load(&self, module_path: &str) -> Option<Vec<String>> {
        let rel = Path::new(module_path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            warn!(path = module_path, "Snippet path escapes repository root, dropping node");
            return None;
        }

        let joined = self.repo_root.join(rel);
        let resolved = match joined.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                warn!(path = module_path, error = %e, "Snippet source unreadable, dropping node");
                return None;
            }
        };
        if !resolved.starts_with(&self.repo_root) {
            warn!(path = module_path, "Snippet path escapes repository root, dropping node");
            return None;
        }

        match std::fs::read_to_string(&resolved) {
            Ok(content) => Some(content.lines().map(String::from).collect()),
            Err(e) => {
                warn!(path = module_path, error = %e, "Snippet source unreadable, dropping node");
                None
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::RankedNode;
    use crate::graph::RelKind;
    use std::fs;
    use tempfile::TempDir;

    fn node_with_span(id: &str, kind: NodeKind, module_path: &str, span: Option<(u32, u32)>) -> Node {
        let mut node = Node::new(kind, module_path, id);
        node.id = id.to_string();
        if let Some((start, end)) = span {
            node = node.with_span(start, end);
        }
        node
    }

    fn result_for(nodes: Vec<Node>) -> QueryResult {
        let ranked: Vec<RankedNode> = nodes
            .into_iter()
            .map(|node| RankedNode {
                node,
                best_hop: 0,
                via_seed: "seed".to_string(),
                seed_distance: 0.0,
            })
            .collect();
        QueryResult {
            query: "q".to_string(),
            seeds_count: ranked.len(),
            expanded_count: ranked.len(),
            returned_nodes: ranked.len(),
            hop: 0,
            rels: RelKind::ALL.to_vec(),
            nodes: ranked,
            edges: Vec::new(),
        }
    }

    fn repo_with_file(lines: usize) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let content: String = (1..=lines).map(|i| format!("line {i}\n")).collect();
        fs::write(root.join("a.py"), content).unwrap();
        (dir, root)
    }

    #[test]
    fn test_span_around_definition() {
        let params = PackParams::default();
        let node = node_with_span("fn:a.py:f", NodeKind::Function, "a.py", Some((20, 24)));
        let (start, end) = span_for(&node, &params, 100).unwrap();
        assert_eq!((start, end), (15, 29));
    }

    #[test]
    fn test_span_clamps_to_max_lines() {
        let mut params = PackParams::default();
        params.max_lines = 10;
        let node = node_with_span("fn:a.py:f", NodeKind::Function, "a.py", Some((20, 80)));
        let (start, end) = span_for(&node, &params, 100).unwrap();
        assert!(end - start + 1 <= 10);
        assert_eq!(start, 15);
    }

    #[test]
    fn test_span_top_window_for_module() {
        let params = PackParams::default();
        let node = node_with_span("mod:a.py", NodeKind::Module, "a.py", None);
        let (start, end) = span_for(&node, &params, 100).unwrap();
        assert_eq!((start, end), (1, TOP_WINDOW));
    }

    #[test]
    fn test_span_top_window_for_missing_lines() {
        let mut params = PackParams::default();
        params.max_lines = 12;
        let node = node_with_span("fn:a.py:f", NodeKind::Function, "a.py", None);
        let (start, end) = span_for(&node, &params, 100).unwrap();
        assert_eq!((start, end), (1, 12));
    }

    #[test]
    fn test_span_stale_definition_dropped() {
        let params = PackParams::default();
        let node = node_with_span("fn:a.py:f", NodeKind::Function, "a.py", Some((50, 60)));
        assert_eq!(span_for(&node, &params, 10), None);
    }

    #[test]
    fn test_spans_conflict_gap() {
        assert!(spans_conflict((1, 10), (5, 20))); // overlap
        assert!(spans_conflict((1, 10), (12, 20))); // 1-line gap
        assert!(spans_conflict((1, 10), (13, 20))); // exactly 2-line gap
        assert!(!spans_conflict((1, 10), (14, 20))); // 3-line gap is distinct
    }

    #[test]
    fn test_numbered_extract_padding() {
        let lines: Vec<String> = (1..=120).map(|i| format!("line {i}")).collect();
        let text = numbered_extract(&lines, 9, 11);
        assert_eq!(text, "009: line 9\n010: line 10\n011: line 11");
    }

    #[test]
    fn test_pack_extracts_and_caps() {
        let (_dir, root) = repo_with_file(100);
        let result = result_for(vec![
            node_with_span("fn:a.py:f1", NodeKind::Function, "a.py", Some((10, 12))),
            node_with_span("fn:a.py:f2", NodeKind::Function, "a.py", Some((40, 42))),
            node_with_span("fn:a.py:f3", NodeKind::Function, "a.py", Some((70, 72))),
            node_with_span("fn:a.py:f4", NodeKind::Function, "a.py", Some((90, 92))),
        ]);

        let mut params = PackParams::default();
        params.per_file_cap = 2;
        let pack = build_pack(&root, result, &params);

        // Per-file cap keeps the first two in rank order.
        assert_eq!(pack.snippets.len(), 2);
        assert_eq!(pack.snippets[0].id, "fn:a.py:f1");
        assert_eq!(pack.snippets[1].id, "fn:a.py:f2");
        assert!(pack.snippets[0].snippet.text.contains("010: line 10"));
    }

    #[test]
    fn test_pack_deduplicates_overlapping_spans() {
        let (_dir, root) = repo_with_file(100);
        let result = result_for(vec![
            node_with_span("fn:a.py:f1", NodeKind::Function, "a.py", Some((10, 20))),
            node_with_span("fn:a.py:f2", NodeKind::Function, "a.py", Some((18, 30))),
        ]);

        let pack = build_pack(&root, result, &PackParams::default());
        assert_eq!(pack.snippets.len(), 1);
        assert_eq!(pack.snippets[0].id, "fn:a.py:f1");
    }

    #[test]
    fn test_pack_cap_monotonicity() {
        let (_dir, root) = repo_with_file(200);
        let nodes: Vec<Node> = (0..5)
            .map(|i| {
                node_with_span(
                    &format!("fn:a.py:f{i}"),
                    NodeKind::Function,
                    "a.py",
                    Some((i * 40 + 10, i * 40 + 12)),
                )
            })
            .collect();

        let mut params = PackParams::default();
        params.per_file_cap = 5;
        params.max_nodes = 5;
        let full = build_pack(&root, result_for(nodes.clone()), &params);

        params.max_nodes = 2;
        let capped = build_pack(&root, result_for(nodes), &params);

        let full_ids: Vec<&str> = full.snippets.iter().map(|s| s.id.as_str()).collect();
        let capped_ids: Vec<&str> = capped.snippets.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(capped_ids, full_ids[..2].to_vec());
    }

    #[test]
    fn test_pack_drops_path_escape() {
        let (_dir, root) = repo_with_file(10);
        let result = result_for(vec![node_with_span(
            "fn:../evil.py:f",
            NodeKind::Function,
            "../evil.py",
            Some((1, 2)),
        )]);

        let pack = build_pack(&root, result, &PackParams::default());
        assert!(pack.snippets.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_pack_drops_symlink_escape() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.py"), "def secret(): pass\n").unwrap();

        let (_dir, root) = repo_with_file(10);
        std::os::unix::fs::symlink(outside.path().join("secret.py"), root.join("link.py"))
            .unwrap();

        let result = result_for(vec![node_with_span(
            "fn:link.py:secret",
            NodeKind::Function,
            "link.py",
            Some((1, 1)),
        )]);

        let pack = build_pack(&root, result, &PackParams::default());
        assert!(pack.snippets.is_empty());
    }

    #[test]
    fn test_markdown_emission() {
        let (_dir, root) = repo_with_file(100);
        let result = result_for(vec![node_with_span(
            "fn:a.py:f1",
            NodeKind::Function,
            "a.py",
            Some((10, 12)),
        )]);
        let pack = build_pack(&root, result, &PackParams::default());

        let md = pack.to_markdown();
        assert!(md.contains("## fn:a.py:f1 [function] a.py:5-17"));
        assert!(md.contains("```python\n005: line 5"));
        assert!(md.contains("017: line 17\n```"));
    }

    #[test]
    fn test_pack_json_round_trip() {
        let (_dir, root) = repo_with_file(20);
        let result = result_for(vec![node_with_span(
            "fn:a.py:f1",
            NodeKind::Function,
            "a.py",
            Some((5, 6)),
        )]);
        let pack = build_pack(&root, result, &PackParams::default());

        let json = serde_json::to_string(&pack).unwrap();
        let back: SnippetPack = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pack);
    }
}
