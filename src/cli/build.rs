//! Build command implementation

use tracing::info;

use crate::cli::{engine_for, BuildArgs};
use crate::core::error::Result;

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let engine = engine_for(args.project)?;
    info!(root = %engine.config().repo_root.display(), "Building");

    let stats = if args.index_only {
        engine.build_index(args.wipe)?
    } else if args.graph_only {
        engine.build_graph(args.wipe)?
    } else {
        engine.build(args.wipe)?
    };

    println!(
        "Built {} ({} files, {} warnings)",
        stats.db_path.display(),
        stats.files,
        stats.warnings
    );
    println!("  nodes: {}", stats.total_nodes);
    for (kind, count) in &stats.node_counts {
        println!("    {kind}: {count}");
    }
    println!("  edges: {}", stats.total_edges);
    for (rel, count) in &stats.edge_counts {
        println!("    {rel}: {count}");
    }
    if stats.indexed > 0 {
        println!("  indexed: {} rows ({}-dim)", stats.indexed, stats.dimension);
    }
    Ok(())
}
