//! Stats command implementation

use crate::cli::{engine_for, StatsArgs};
use crate::core::error::Result;

/// Run the stats command
pub fn run(args: StatsArgs) -> Result<()> {
    let engine = engine_for(args.project)?;
    let stats = engine.stats()?;

    println!("{}", stats.db_path.display());
    println!("  nodes: {}", stats.total_nodes);
    for (kind, count) in &stats.node_counts {
        println!("    {kind}: {count}");
    }
    println!("  edges: {}", stats.total_edges);
    for (rel, count) in &stats.edge_counts {
        println!("    {rel}: {count}");
    }
    Ok(())
}
