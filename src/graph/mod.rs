//! Core Graph Value Types
//!
//! Immutable node/edge value types, deterministic identifier construction,
//! and path normalization. Everything here is pure: identifiers are a
//! function of (kind, module_path, qualname) and nothing else, so rebuilds
//! of the same source always produce the same ids.
//!
//! @module graph

use std::path::Path;

use serde::{Deserialize, Serialize};

// =============================================================================
// NODE KIND
// =============================================================================

/// Classification of graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A `.py` file
    Module,
    /// A class definition
    Class,
    /// A top-level function definition
    Function,
    /// A function definition whose enclosing lexical context is a class
    Method,
    /// An unresolved external name (never has a source location)
    Symbol,
}

impl NodeKind {
    /// All kinds that carry a source definition.
    pub const DEFINITIONS: [NodeKind; 4] = [
        NodeKind::Module,
        NodeKind::Class,
        NodeKind::Function,
        NodeKind::Method,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Symbol => "symbol",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(Self::Module),
            "class" => Some(Self::Class),
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "symbol" => Some(Self::Symbol),
            _ => None,
        }
    }

    /// Ranking priority: concrete definitions first, modules and unresolved
    /// symbols last.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Function => 0,
            Self::Method => 1,
            Self::Class => 2,
            Self::Module => 3,
            Self::Symbol => 4,
        }
    }

    /// Whether nodes of this kind participate in the semantic index.
    pub fn is_embeddable(&self) -> bool {
        !matches!(self, Self::Symbol)
    }
}

// =============================================================================
// RELATION KIND
// =============================================================================

/// Classification of graph edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelKind {
    Contains,
    Calls,
    Imports,
    Inherits,
}

impl RelKind {
    pub const ALL: [RelKind; 4] = [
        RelKind::Contains,
        RelKind::Calls,
        RelKind::Imports,
        RelKind::Inherits,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::Inherits => "INHERITS",
        }
    }

    /// Parse a relation name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CONTAINS" => Some(Self::Contains),
            "CALLS" => Some(Self::Calls),
            "IMPORTS" => Some(Self::Imports),
            "INHERITS" => Some(Self::Inherits),
            _ => None,
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// One named program element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique, deterministic identifier
    pub id: String,
    pub kind: NodeKind,
    /// Short name (last path segment of the qualname)
    pub name: String,
    /// Dotted path within the module (e.g. `C.f`)
    pub qualname: String,
    /// Repo-relative POSIX path; empty for unresolved externals
    pub module_path: String,
    /// 1-based inclusive; `None` means "no location"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

impl Node {
    /// Create a definition node; the id is derived from
    /// (kind, module_path, qualname).
    pub fn new(kind: NodeKind, module_path: &str, qualname: &str) -> Self {
        let name = qualname.rsplit('.').next().unwrap_or(qualname).to_string();
        Self {
            id: node_id(kind, module_path, qualname),
            kind,
            name,
            qualname: qualname.to_string(),
            module_path: module_path.to_string(),
            lineno: None,
            end_lineno: None,
            docstring: None,
        }
    }

    /// Create an unresolved-external symbol node for a dotted name.
    pub fn symbol(dotted: &str) -> Self {
        let name = dotted.rsplit('.').next().unwrap_or(dotted).to_string();
        Self {
            id: symbol_id(dotted),
            kind: NodeKind::Symbol,
            name,
            qualname: dotted.to_string(),
            module_path: String::new(),
            lineno: None,
            end_lineno: None,
            docstring: None,
        }
    }

    pub fn with_span(mut self, lineno: u32, end_lineno: u32) -> Self {
        self.lineno = Some(lineno);
        self.end_lineno = Some(end_lineno);
        self
    }

    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring;
        self
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// Evidence attached to an edge: where in source the relation is expressed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
}

impl Evidence {
    pub fn at(lineno: u32, expr: impl Into<String>) -> Self {
        Self {
            lineno: Some(lineno),
            expr: Some(expr.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lineno.is_none() && self.expr.is_none()
    }
}

/// A directed, typed, evidence-carrying relation between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub rel: RelKind,
    pub dst: String,
    #[serde(default, skip_serializing_if = "Evidence::is_empty")]
    pub evidence: Evidence,
}

impl Edge {
    pub fn new(src: impl Into<String>, rel: RelKind, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            rel,
            dst: dst.into(),
            evidence: Evidence::default(),
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Build the deterministic node id for (kind, module_path, qualname).
pub fn node_id(kind: NodeKind, module_path: &str, qualname: &str) -> String {
    match kind {
        NodeKind::Module => format!("mod:{module_path}"),
        NodeKind::Class => format!("cls:{module_path}:{qualname}"),
        NodeKind::Function => format!("fn:{module_path}:{qualname}"),
        NodeKind::Method => format!("m:{module_path}:{qualname}"),
        NodeKind::Symbol => symbol_id(qualname),
    }
}

/// Build the stable id for an unresolved external name.
pub fn symbol_id(dotted: &str) -> String {
    format!("sym:{dotted}")
}

// =============================================================================
// PATH HELPERS
// =============================================================================

/// Normalize a repo-relative filesystem path to a POSIX string: forward
/// slashes, no leading `./`.
pub fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

/// Dotted module qualname for a repo-relative `.py` path.
///
/// `pkg/a.py` -> `pkg.a`; a package `__init__.py` collapses onto the
/// package itself (`pkg/__init__.py` -> `pkg`).
pub fn module_qualname(module_path: &str) -> String {
    let trimmed = module_path.strip_suffix(".py").unwrap_or(module_path);
    let trimmed = trimmed
        .strip_suffix("/__init__")
        .or_else(|| (trimmed == "__init__").then_some(""))
        .unwrap_or(trimmed);
    trimmed.replace('/', ".")
}

// =============================================================================
// TESTS
// =============================================================================
