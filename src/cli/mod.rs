//! CLI command definitions and handlers

pub mod build;
pub mod node;
pub mod pack;
pub mod query;
pub mod stats;

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::engine::CodeKg;
use crate::graph::RelKind;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Magenta.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Deterministic code knowledge graph and hybrid retrieval
#[derive(Parser, Debug)]
#[command(name = "codekg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = styles())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the graph store and semantic index
    Build(BuildArgs),

    /// Run a hybrid query, printing the result as JSON
    Query(QueryArgs),

    /// Run a query and extract source-grounded snippets
    Pack(PackArgs),

    /// Show store-wide counts
    Stats(StatsArgs),

    /// Look up one node by id
    Node(NodeArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Repository root (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Clear the store and index before writing
    #[arg(long)]
    pub wipe: bool,

    /// Extract and store only; skip the semantic index
    #[arg(long, conflicts_with = "index_only")]
    pub graph_only: bool,

    /// Rebuild the semantic index from the existing store
    #[arg(long)]
    pub index_only: bool,
}

/// Query options shared by `query` and `pack`
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// The natural-language query
    pub query: String,

    /// Number of semantic seeds
    #[arg(short, long, default_value_t = 8)]
    pub k: usize,

    /// Expansion bound in edges
    #[arg(long, default_value_t = 1)]
    pub hop: usize,

    /// Restrict expansion to these relations (can be repeated)
    #[arg(long = "rel", value_name = "REL")]
    pub rels: Vec<String>,

    /// Keep unresolved-symbol nodes in the result
    #[arg(long)]
    pub include_symbols: bool,

    /// Repository root (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

/// Arguments for the pack command
#[derive(Parser, Debug)]
pub struct PackArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Context lines around each definition
    #[arg(long, default_value_t = 5)]
    pub context: u32,

    /// Cap on any single snippet's height
    #[arg(long, default_value_t = 60)]
    pub max_lines: u32,

    /// Global cap on retained snippets
    #[arg(long, default_value_t = 15)]
    pub max_nodes: usize,

    /// Cap on snippets per source file
    #[arg(long, default_value_t = 3)]
    pub per_file_cap: usize,

    /// Output format
    #[arg(short = 'f', long, default_value = "markdown")]
    pub format: PackFormat,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Repository root (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

/// Arguments for the node command
#[derive(Parser, Debug)]
pub struct NodeArgs {
    /// Node id, e.g. `m:pkg/db.py:DatabaseManager.connect`
    pub id: String,

    /// Repository root (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

/// Output format for snippet packs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PackFormat {
    /// Line-numbered markdown sections
    Markdown,
    /// Structured JSON
    Json,
}

/// Construct the engine for a project directory.
pub(crate) fn engine_for(project: Option<PathBuf>) -> Result<CodeKg> {
    let root = match project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    Ok(CodeKg::new(Config::load(root)?))
}

/// Parse `--rel` values; an empty list means all relations.
pub(crate) fn parse_rels(names: &[String]) -> Result<BTreeSet<RelKind>> {
    if names.is_empty() {
        return Ok(RelKind::ALL.into_iter().collect());
    }
    names
        .iter()
        .map(|name| {
            RelKind::parse(name)
                .ok_or_else(|| Error::query(format!("unknown relation '{name}'")))
        })
        .collect()
}
