//! Pack command implementation

use crate::cli::{engine_for, PackArgs, PackFormat};
use crate::core::error::Result;
use crate::engine::PackParams;

/// Run the pack command
pub fn run(args: PackArgs) -> Result<()> {
    let params = PackParams {
        query: super::query::to_params(&args.query)?,
        context: args.context,
        max_lines: args.max_lines,
        max_nodes: args.max_nodes,
        per_file_cap: args.per_file_cap,
    };
    let engine = engine_for(args.query.project)?;
    let pack = engine.pack(&params)?;

    match args.format {
        PackFormat::Markdown => print!("{}", pack.to_markdown()),
        PackFormat::Json => println!("{}", serde_json::to_string_pretty(&pack)?),
    }
    Ok(())
}
