//! Node lookup command implementation

use crate::cli::{engine_for, NodeArgs};
use crate::core::error::Result;

/// Run the node command
pub fn run(args: NodeArgs) -> Result<()> {
    let engine = engine_for(args.project)?;
    match engine.node(&args.id)? {
        Some(node) => println!("{}", serde_json::to_string_pretty(&node)?),
        None => println!("not found: {}", args.id),
    }
    Ok(())
}
