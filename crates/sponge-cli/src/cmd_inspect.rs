/// Implementation of `sponge inspect`.
///
/// Reads the persisted download state of one key and prints a summary.
///
/// # Output format
///
/// ```text
/// Key: videos/intro.mp4
/// Size: 5242880 bytes
/// Blocks: 3/5 present
/// Complete: no
/// Missing: 1, 3
/// ```
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use sponge_cache::{BlockCache, MemoryEngine};
use sponge_types::CacheProvider;

use crate::InspectArgs;
use crate::config::SpongeConfig;

/// Run the `sponge inspect` command.
///
/// # Errors
///
/// Returns an error if the cache file cannot be opened or the state of
/// the key is corrupt.
pub async fn run(args: &InspectArgs, config: &SpongeConfig) -> Result<()> {
    let engine = MemoryEngine::open(&config.cache_file)
        .with_context(|| format!("cannot open cache {}", config.cache_file.display()))?;
    let cache = BlockCache::<String>::open(Arc::new(engine))?;

    let state = cache
        .request_disk_metadata(&args.key)
        .await
        .with_context(|| format!("cannot read the state of {}", args.key))?;

    let Some(state) = state else {
        println!("Key: {}", args.key);
        println!("Not cached");
        return Ok(());
    };

    println!("Key: {}", args.key);
    match state.size() {
        Some(size) => println!("Size: {size} bytes"),
        None => println!("Size: unknown"),
    }
    println!("Blocks: {}/{} present", state.present_count(), state.slot_count());
    println!("Complete: {}", if state.is_complete()? { "yes" } else { "no" });

    if args.missing {
        let missing = missing_ranges(state.presence());
        println!("Missing: {}", if missing.is_empty() { "none" } else { missing.as_str() });
    }
    Ok(())
}

/// Render the ids of absent blocks as comma-separated ranges,
/// e.g. `0-2, 5`.
fn missing_ranges(presence: &[bool]) -> String {
    let mut out = String::new();
    let mut id = 0;
    while id < presence.len() {
        if presence[id] {
            id += 1;
            continue;
        }
        let start = id;
        while id < presence.len() && !presence[id] {
            id += 1;
        }
        if !out.is_empty() {
            out.push_str(", ");
        }
        if id - start == 1 {
            let _ = write!(out, "{start}");
        } else {
            let _ = write!(out, "{start}-{}", id - 1);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_of_missing_blocks() {
        assert_eq!(missing_ranges(&[]), "");
        assert_eq!(missing_ranges(&[true, true]), "");
        assert_eq!(missing_ranges(&[false]), "0");
        assert_eq!(missing_ranges(&[false, false, false, true, true, false]), "0-2, 5");
        assert_eq!(missing_ranges(&[true, false, true, false, false]), "1, 3-4");
    }
}
