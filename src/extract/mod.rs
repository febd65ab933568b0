//! Static Extractor
//!
//! Walks a repository, parses every `.py` file, and emits the canonical
//! node/edge sequence. Files are enumerated in sorted order and each file
//! is processed independently, so per-file work runs on rayon and the
//! merged output is byte-identical across runs regardless of filesystem
//! iteration order or thread scheduling.
//!
//! Emission order per file: module node, definitions in tree-traversal
//! order, symbol nodes (sorted), pass-1 edges, pass-2 edges. Across files,
//! sorted file order. Downstream consumers rely on this for stable diffs.
//!
//! @module extract

pub mod python;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::error::{Error, Result};
use crate::graph::{module_qualname, normalize_path, Edge, Node};

// =============================================================================
// SKIP LIST
// =============================================================================

/// Well-known non-source directories. Dot-directories (`.git`, `.venv`,
/// `.tox`, ...) are excluded by the hidden filter and need no entry here.
const SKIP_DIRS: &[&str] = &[
    "__pycache__",
    "venv",
    "env",
    "node_modules",
    "build",
    "dist",
    "site-packages",
];

// =============================================================================
// REGISTRIES
// =============================================================================

/// Maps dotted module qualnames to repo-relative paths, built from the file
/// list alone so pass 1 can resolve imports without parsing anything.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: BTreeMap<String, String>,
}

impl ModuleRegistry {
    pub(crate) fn from_paths(paths: impl IntoIterator<Item = String>) -> Self {
        let mut modules = BTreeMap::new();
        for path in paths {
            let qual = module_qualname(&path);
            // First (sorted) path wins when a package and a module collide.
            modules.entry(qual).or_insert(path);
        }
        Self { modules }
    }

    pub(crate) fn module_path(&self, dotted: &str) -> Option<&str> {
        self.modules.get(dotted).map(String::as_str)
    }
}

/// Definitions of one module, keyed by qualname
#[derive(Debug, Clone, Default)]
pub(crate) struct ModuleDefs {
    pub functions: BTreeMap<String, String>,
    pub classes: BTreeMap<String, String>,
    pub methods: BTreeMap<String, String>,
}

/// Repo-wide definition index for cross-module call resolution
#[derive(Debug, Default)]
pub(crate) struct DefIndex {
    by_module: BTreeMap<String, ModuleDefs>,
}

impl DefIndex {
    pub(crate) fn from_files(files: impl IntoIterator<Item = (String, ModuleDefs)>) -> Self {
        Self {
            by_module: files.into_iter().collect(),
        }
    }

    pub(crate) fn module(&self, module_path: &str) -> Option<&ModuleDefs> {
        self.by_module.get(module_path)
    }
}

// =============================================================================
// EXTRACTION RESULT
// =============================================================================

/// The canonical ordered node/edge sequence for a repository
#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Number of `.py` files successfully extracted
    pub files: usize,
    /// Non-fatal extraction warnings (unreadable or unparseable files,
    /// skipped constructs)
    pub warnings: usize,
}

// =============================================================================
// REPOSITORY EXTRACTION
// =============================================================================

/// Extract the full node/edge sequence for a repository root.
///
/// Fatal only when the root itself cannot be enumerated; everything else
/// degrades to a warning and a skipped file or construct.
pub fn extract_repo(repo_root: &Path) -> Result<Extraction> {
    let files = collect_py_files(repo_root)?;
    info!(root = %repo_root.display(), files = files.len(), "Extracting repository");

    let registry = ModuleRegistry::from_paths(files.iter().map(|(_, rel)| rel.clone()));

    // Pass 1, file-parallel; rayon preserves input order so the merge below
    // follows the sorted file list.
    let pass1: Vec<Option<(python::FileGraph, String)>> = files
        .par_iter()
        .map(|(abs, rel)| {
            let source = match std::fs::read_to_string(abs) {
                Ok(s) => s,
                Err(e) => {
                    warn!(file = %rel, error = %e, "Skipping unreadable file");
                    return None;
                }
            };
            match python::definitions(rel, &source, &registry) {
                Some(fg) => Some((fg, source)),
                None => {
                    warn!(file = %rel, "Skipping unparseable file");
                    None
                }
            }
        })
        .collect();

    let defs = DefIndex::from_files(
        pass1
            .iter()
            .flatten()
            .map(|(fg, _)| (fg.module_path.clone(), fg.defs.clone())),
    );

    // Pass 2, file-parallel against the shared definition index.
    let pass2: Vec<Option<python::CallGraph>> = pass1
        .par_iter()
        .map(|slot| {
            slot.as_ref()
                .map(|(fg, source)| python::calls(fg, source, &defs))
        })
        .collect();

    // Deterministic merge in sorted file order.
    let mut out = Extraction::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for (slot, call_slot) in pass1.into_iter().zip(pass2) {
        let Some((fg, _)) = slot else {
            out.warnings += 1;
            continue;
        };
        let cg = call_slot.unwrap_or_default();
        out.files += 1;
        out.warnings += fg.warnings + cg.warnings;

        debug!(
            file = %fg.module_path,
            nodes = fg.nodes.len(),
            calls = cg.edges.len(),
            "Extracted"
        );

        for node in fg.nodes {
            if seen.insert(node.id.clone()) {
                out.nodes.push(node);
            }
        }

        let mut symbols: BTreeSet<String> = fg.symbols;
        symbols.extend(cg.symbols);
        for dotted in symbols {
            let sym = Node::symbol(&dotted);
            if seen.insert(sym.id.clone()) {
                out.nodes.push(sym);
            }
        }

        out.edges.extend(fg.edges);
        out.edges.extend(cg.edges);
    }

    info!(
        nodes = out.nodes.len(),
        edges = out.edges.len(),
        warnings = out.warnings,
        "Extraction complete"
    );
    Ok(out)
}

/// Enumerate `.py` files under the root in sorted repo-relative order.
///
/// Skips hidden directories, the well-known non-source directories, and
/// symbolic links. The sort over normalized relative paths is the ordering
/// contract for everything downstream.
fn collect_py_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !root.is_dir() {
        return Err(Error::RepoNotFound {
            path: root.to_path_buf(),
        });
    }

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if entry.depth() == 0 || !is_dir {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .map(|name| !SKIP_DIRS.contains(&name))
                .unwrap_or(true)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        let rel = match path.strip_prefix(root) {
            Ok(r) => normalize_path(r),
            Err(_) => continue,
        };
        files.push((path.to_path_buf(), rel));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

// =============================================================================
// TESTS
// =============================================================================
