//! Tree-sitter Based Python Extraction
//!
//! Per-file extraction runs in two passes over the syntax tree:
//!
//! - Pass 1 (`definitions`) emits the module node, class/function/method
//!   nodes with docstrings and spans, CONTAINS edges, IMPORTS edges, and
//!   INHERITS edges, plus the local import-binding table used for
//!   resolution.
//! - Pass 2 (`calls`) re-parses the file and emits one CALLS edge per call
//!   expression, resolving the callee best-effort against same-module
//!   definitions, import bindings, and the current class. Anything it
//!   cannot resolve becomes an edge to a symbol node; the resolver never
//!   invents a concrete target.
//!
//! @module extract/python

use std::collections::{BTreeMap, BTreeSet};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node as TsNode, Parser, Query, QueryCursor, Tree};
use tracing::warn;

use super::{DefIndex, ModuleDefs, ModuleRegistry};
use crate::graph::{node_id, symbol_id, Edge, Evidence, Node, NodeKind, RelKind};

// =============================================================================
// TYPES
// =============================================================================

/// What a locally bound import name points at
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    /// Destination of the IMPORTS edge that bound this name
    pub target_id: String,
    /// Set when the target is an in-repo module (enables cross-module
    /// function resolution in pass 2)
    pub module_path: Option<String>,
}

/// Span of an emitted function or method, for enclosing-definition lookup
#[derive(Debug, Clone)]
pub(crate) struct DefSpan {
    pub id: String,
    pub start: u32,
    pub end: u32,
    /// Qualname of the enclosing class, for methods
    pub class_qualname: Option<String>,
}

/// Pass-1 output for one file
#[derive(Debug, Default)]
pub(crate) struct FileGraph {
    pub module_path: String,
    /// Module node followed by definitions in tree-traversal order
    pub nodes: Vec<Node>,
    /// CONTAINS, IMPORTS, INHERITS edges
    pub edges: Vec<Edge>,
    /// Dotted names that need symbol nodes
    pub symbols: BTreeSet<String>,
    /// Local name -> import binding
    pub bindings: BTreeMap<String, Binding>,
    /// Definitions in this module, for call/base resolution
    pub defs: ModuleDefs,
    /// Emitted function/method spans
    pub def_spans: Vec<DefSpan>,
    pub warnings: usize,
}

/// Pass-2 output for one file
#[derive(Debug, Default)]
pub(crate) struct CallGraph {
    pub edges: Vec<Edge>,
    pub symbols: BTreeSet<String>,
    pub warnings: usize,
}

/// Lexical container of the cursor during pass 1
enum Container {
    Module,
    Class(String),
    Function,
}

// =============================================================================
// PARSING
// =============================================================================

fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&python_language()).ok()?;
    parser.parse(source, None)
}

fn text<'a>(node: TsNode, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn line_of(node: TsNode) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: TsNode) -> u32 {
    node.end_position().row as u32 + 1
}

/// Leading docstring of a block-like node: the first statement's string
/// literal, if any.
fn docstring_of(block: TsNode, source: &[u8]) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let mut cursor = string.walk();
    let content: String = string
        .children(&mut cursor)
        .filter(|c| c.kind() == "string_content")
        .map(|c| text(c, source).to_string())
        .collect();
    Some(content)
}

// =============================================================================
// PASS 1: DEFINITIONS
// =============================================================================

/// Extract the module node, definitions, and pass-1 edges for one file.
///
/// Returns `None` when the file cannot be parsed; the caller counts the
/// warning and skips the file.
pub(crate) fn definitions(
    module_path: &str,
    source: &str,
    registry: &ModuleRegistry,
) -> Option<FileGraph> {
    let tree = parse(source)?;
    let root = tree.root_node();
    if root.kind() != "module" {
        return None;
    }

    let module_qual = crate::graph::module_qualname(module_path);
    let module_id = node_id(NodeKind::Module, module_path, &module_qual);

    let mut pass = Pass1 {
        source: source.as_bytes(),
        module_path,
        module_id: module_id.clone(),
        registry,
        out: FileGraph {
            module_path: module_path.to_string(),
            ..FileGraph::default()
        },
        pending_bases: Vec::new(),
    };

    let module_node = Node::new(NodeKind::Module, module_path, &module_qual)
        .with_docstring(docstring_of(root, pass.source));
    pass.out.nodes.push(module_node);

    pass.visit_block(root, &Container::Module);
    pass.resolve_bases();

    Some(pass.out)
}

struct Pass1<'a> {
    source: &'a [u8],
    module_path: &'a str,
    module_id: String,
    registry: &'a ModuleRegistry,
    out: FileGraph,
    /// INHERITS references deferred until all same-module classes are known
    pending_bases: Vec<(String, String, u32)>,
}

impl<'a> Pass1<'a> {
    fn visit_block(&mut self, node: TsNode, container: &Container) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit_stmt(child, container);
        }
    }

    fn visit_stmt(&mut self, node: TsNode, container: &Container) {
        match node.kind() {
            "decorated_definition" => {
                if let Some(def) = node.child_by_field_name("definition") {
                    self.visit_stmt(def, container);
                }
            }
            "class_definition" => self.visit_class(node, container),
            "function_definition" => self.visit_function(node, container),
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            _ => {
                // Defs and imports may hide inside compound statements
                // (if/try/for blocks at module level).
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.visit_stmt(child, container);
                }
            }
        }
    }

    fn visit_class(&mut self, node: TsNode, container: &Container) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.out.warnings += 1;
            return;
        };
        let name = text(name_node, self.source).to_string();

        let qualname = match container {
            Container::Module => name,
            Container::Class(parent) => format!("{parent}.{name}"),
            // Classes local to a function body have no stable qualname.
            Container::Function => return,
        };
        let class_id = node_id(NodeKind::Class, self.module_path, &qualname);

        let class_node = Node::new(NodeKind::Class, self.module_path, &qualname)
            .with_span(line_of(node), end_line_of(node))
            .with_docstring(
                node.child_by_field_name("body")
                    .and_then(|b| docstring_of(b, self.source)),
            );
        self.out.nodes.push(class_node);

        let parent_id = match container {
            Container::Module => self.module_id.clone(),
            Container::Class(parent) => node_id(NodeKind::Class, self.module_path, parent),
            Container::Function => unreachable!(),
        };
        self.out
            .edges
            .push(Edge::new(parent_id, RelKind::Contains, class_id.clone()));

        self.out
            .defs
            .classes
            .insert(qualname.clone(), class_id.clone());

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for arg in superclasses.named_children(&mut cursor) {
                if arg.kind() == "keyword_argument" || arg.kind() == "comment" {
                    continue;
                }
                let expr = text(arg, self.source).to_string();
                self.pending_bases.push((class_id.clone(), expr, line_of(arg)));
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_block(body, &Container::Class(qualname));
        }
    }

    fn visit_function(&mut self, node: TsNode, container: &Container) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.out.warnings += 1;
            return;
        };
        let name = text(name_node, self.source).to_string();

        let (kind, qualname, parent_id, class_qualname) = match container {
            Container::Module => (
                NodeKind::Function,
                name,
                self.module_id.clone(),
                None,
            ),
            Container::Class(class) => (
                NodeKind::Method,
                format!("{class}.{name}"),
                node_id(NodeKind::Class, self.module_path, class),
                Some(class.clone()),
            ),
            // Defs nested inside a function body are not definitions of the
            // module surface; their calls attach to the enclosing def.
            Container::Function => return,
        };

        let def_id = node_id(kind, self.module_path, &qualname);
        let start = line_of(node);
        let end = end_line_of(node);

        let def_node = Node::new(kind, self.module_path, &qualname)
            .with_span(start, end)
            .with_docstring(
                node.child_by_field_name("body")
                    .and_then(|b| docstring_of(b, self.source)),
            );
        self.out.nodes.push(def_node);

        self.out
            .edges
            .push(Edge::new(parent_id, RelKind::Contains, def_id.clone()));

        match kind {
            NodeKind::Function => {
                self.out.defs.functions.insert(qualname.clone(), def_id.clone());
            }
            NodeKind::Method => {
                self.out.defs.methods.insert(qualname.clone(), def_id.clone());
            }
            _ => {}
        }

        self.out.def_spans.push(DefSpan {
            id: def_id,
            start,
            end,
            class_qualname,
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_block(body, &Container::Function);
        }
    }

    fn visit_import(&mut self, node: TsNode) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let (dotted, alias) = match child.kind() {
                "dotted_name" => (text(child, self.source).to_string(), None),
                "aliased_import" => {
                    let Some(name) = child.child_by_field_name("name") else {
                        continue;
                    };
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|a| text(a, self.source).to_string());
                    (text(name, self.source).to_string(), alias)
                }
                _ => continue,
            };
            self.bind_import(&dotted, alias, line_of(child), text(child, self.source));
        }
    }

    fn visit_import_from(&mut self, node: TsNode) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let base = text(module_node, self.source).to_string();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.id() == module_node.id() {
                continue;
            }
            match child.kind() {
                "dotted_name" | "aliased_import" => {
                    let (name, alias) = if child.kind() == "aliased_import" {
                        let Some(name) = child.child_by_field_name("name") else {
                            continue;
                        };
                        (
                            text(name, self.source).to_string(),
                            child
                                .child_by_field_name("alias")
                                .map(|a| text(a, self.source).to_string()),
                        )
                    } else {
                        (text(child, self.source).to_string(), None)
                    };

                    let full = if base.ends_with('.') {
                        format!("{base}{name}")
                    } else {
                        format!("{base}.{name}")
                    };
                    let bound_as = alias.unwrap_or_else(|| name.clone());
                    self.bind_import(&full, Some(bound_as), line_of(child), text(child, self.source));
                }
                "wildcard_import" => {
                    // `from m import *`: record the module relation, bind nothing.
                    let (target_id, _) = self.import_target(&base);
                    self.out.edges.push(
                        Edge::new(self.module_id.clone(), RelKind::Imports, target_id)
                            .with_evidence(Evidence::at(line_of(child), format!("{base}.*"))),
                    );
                }
                _ => {}
            }
        }
    }

    /// Emit an IMPORTS edge for a dotted name and record the local binding.
    fn bind_import(&mut self, dotted: &str, alias: Option<String>, lineno: u32, expr: &str) {
        let (target_id, module_path) = self.import_target(dotted);
        self.out.edges.push(
            Edge::new(self.module_id.clone(), RelKind::Imports, target_id.clone())
                .with_evidence(Evidence::at(lineno, expr)),
        );
        let key = alias.unwrap_or_else(|| dotted.to_string());
        self.out.bindings.insert(
            key,
            Binding {
                target_id,
                module_path,
            },
        );
    }

    /// Destination for an imported dotted name: the in-repo module node when
    /// one exists, a symbol node otherwise.
    fn import_target(&mut self, dotted: &str) -> (String, Option<String>) {
        match self.registry.module_path(dotted) {
            Some(path) => (
                node_id(NodeKind::Module, path, ""),
                Some(path.to_string()),
            ),
            None => {
                self.out.symbols.insert(dotted.to_string());
                (symbol_id(dotted), None)
            }
        }
    }

    /// Resolve deferred INHERITS references: same-module classes first, then
    /// import bindings, then a symbol node.
    fn resolve_bases(&mut self) {
        let bases = std::mem::take(&mut self.pending_bases);
        for (class_id, expr, lineno) in bases {
            let dst = if let Some(id) = self.out.defs.classes.get(&expr) {
                id.clone()
            } else if let Some(binding) = self.out.bindings.get(&expr) {
                binding.target_id.clone()
            } else {
                self.out.symbols.insert(expr.clone());
                symbol_id(&expr)
            };
            self.out.edges.push(
                Edge::new(class_id, RelKind::Inherits, dst)
                    .with_evidence(Evidence::at(lineno, expr)),
            );
        }
    }
}

// =============================================================================
// PASS 2: CALL GRAPH
// =============================================================================

/// One pattern per callee shape: a bare name, or an attribute access with a
/// receiver.
const CALL_QUERY: &str = "\
(call function: (identifier) @callee) @call
(call function: (attribute object: (_) @receiver attribute: (identifier) @callee)) @call";

/// Extract CALLS edges for one file, resolving against the repo-wide
/// definition index built from pass 1.
pub(crate) fn calls(file: &FileGraph, source: &str, index: &DefIndex) -> CallGraph {
    let mut out = CallGraph::default();

    let Some(tree) = parse(source) else {
        out.warnings += 1;
        return out;
    };
    let lang = python_language();
    let query = match Query::new(&lang, CALL_QUERY) {
        Ok(q) => q,
        Err(e) => {
            warn!(error = %e, "call query failed to compile");
            out.warnings += 1;
            return out;
        }
    };

    let callee_idx = query.capture_index_for_name("callee");
    let receiver_idx = query.capture_index_for_name("receiver");
    let call_idx = query.capture_index_for_name("call");

    let src = source.as_bytes();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), src);

    while let Some(m) = matches.next() {
        let mut call_node: Option<TsNode> = None;
        let mut callee: Option<&str> = None;
        let mut receiver: Option<&str> = None;

        for capture in m.captures {
            let idx = Some(capture.index);
            if idx == call_idx {
                call_node = Some(capture.node);
            } else if idx == callee_idx {
                callee = Some(text(capture.node, src));
            } else if idx == receiver_idx {
                receiver = Some(text(capture.node, src));
            }
        }

        let (Some(call_node), Some(callee)) = (call_node, callee) else {
            continue;
        };
        let line = line_of(call_node);

        // Calls outside any definition are dropped.
        let Some(enclosing) = enclosing_def(&file.def_spans, line) else {
            continue;
        };

        let dst = resolve_call(file, index, enclosing, receiver, callee, &mut out);
        out.edges.push(
            Edge::new(enclosing.id.clone(), RelKind::Calls, dst)
                .with_evidence(Evidence::at(line, text(call_node, src))),
        );
    }

    out
}

/// Smallest emitted function/method span containing the line.
fn enclosing_def(spans: &[DefSpan], line: u32) -> Option<&DefSpan> {
    spans
        .iter()
        .filter(|s| s.start <= line && line <= s.end)
        .min_by_key(|s| s.end - s.start)
}

/// Best-effort callee resolution; falls back to a symbol derived from the
/// textual callee expression.
fn resolve_call(
    file: &FileGraph,
    index: &DefIndex,
    enclosing: &DefSpan,
    receiver: Option<&str>,
    callee: &str,
    out: &mut CallGraph,
) -> String {
    let own_defs = index.module(&file.module_path);

    match receiver {
        None => {
            // Bare name: same-module function, then import binding.
            if let Some(defs) = own_defs {
                if let Some(id) = defs.functions.get(callee) {
                    return id.clone();
                }
            }
            if let Some(binding) = file.bindings.get(callee) {
                return binding.target_id.clone();
            }
            out.symbols.insert(callee.to_string());
            symbol_id(callee)
        }
        Some(obj) => {
            // self/cls or the class's own name: a method on the current class.
            if let Some(class) = &enclosing.class_qualname {
                let short = class.rsplit('.').next().unwrap_or(class);
                if obj == "self" || obj == "cls" || obj == class || obj == short {
                    if let Some(defs) = own_defs {
                        if let Some(id) = defs.methods.get(&format!("{class}.{callee}")) {
                            return id.clone();
                        }
                    }
                }
            }
            // A module bound by imports: a function within that module.
            if let Some(binding) = file.bindings.get(obj) {
                if let Some(module_path) = &binding.module_path {
                    if let Some(defs) = index.module(module_path) {
                        if let Some(id) = defs.functions.get(callee) {
                            return id.clone();
                        }
                    }
                }
            }
            let dotted = format!("{obj}.{callee}");
            out.symbols.insert(dotted.clone());
            symbol_id(&dotted)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
