//! `cache` command handlers

use crate::cli::output::{format_cache_stats, to_json};
use crate::cli::{CacheCommands, Context};
use serde_json::json;

/// Handle `costmesh cache stats|clear|prune`
pub fn handle_cache(command: &CacheCommands, ctx: &Context) -> anyhow::Result<String> {
    let cache = ctx.cache();

    match command {
        CacheCommands::Stats => {
            let stats = cache.stats()?;
            if ctx.json {
                to_json(&stats)
            } else {
                Ok(format_cache_stats(&stats))
            }
        }
        CacheCommands::Clear => {
            let removed = cache.clear()?;
            if ctx.json {
                to_json(&json!({ "removed": removed }))
            } else {
                Ok(format!(
                    "✓ Removed {} cache entr{} from {}",
                    removed,
                    if removed == 1 { "y" } else { "ies" },
                    cache.directory().display()
                ))
            }
        }
        CacheCommands::Prune => {
            let removed = cache.prune()?;
            if ctx.json {
                to_json(&json!({ "pruned": removed }))
            } else {
                Ok(format!("✓ Pruned {} expired cache entr{}", removed, if removed == 1 { "y" } else { "ies" }))
            }
        }
    }
}
