//! Query command implementation

use crate::cli::{engine_for, parse_rels, QueryArgs};
use crate::core::error::Result;
use crate::engine::QueryParams;

pub(crate) fn to_params(args: &QueryArgs) -> Result<QueryParams> {
    Ok(QueryParams {
        q: args.query.clone(),
        k: args.k,
        hop: args.hop,
        rels: parse_rels(&args.rels)?,
        include_symbols: args.include_symbols,
    })
}

/// Run the query command
pub fn run(args: QueryArgs) -> Result<()> {
    let params = to_params(&args)?;
    let engine = engine_for(args.project)?;
    let result = engine.query(&params)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
