/// Implementation of `sponge validate`.
///
/// Decodes every download state in the cache file and checks that every
/// block marked present has stored content of a legal length. Prints a
/// series of success checkmarks (`✓`) or one diagnostic line (`✗`) per
/// broken resource; exits with code 1 if anything is broken.
///
/// # Success output
///
/// ```text
/// ✓ Snapshot: cache.spg readable
/// ✓ States: 3 resources decoded (2 complete)
/// ✓ Blocks: 12 present blocks verified
/// ```
///
/// # Failure output
///
/// ```text
/// ✗ videos/intro.mp4: block 3 is marked present but has no stored content
/// ```
use anyhow::{Context, Result, anyhow};
use sponge_cache::{CONTENT_COLLECTION, MemoryEngine, STATE_COLLECTION};
use sponge_types::{Block, DownloadState, KeyValueStore, StateError, StorageEngine};
use sponge_wire::content_key;

use crate::config::SpongeConfig;

/// Run the `sponge validate` command.
///
/// # Errors
///
/// Returns an error if the cache file cannot be read or any resource in
/// it fails validation.
pub fn run(config: &SpongeConfig) -> Result<()> {
    let path = &config.cache_file;
    let engine = MemoryEngine::open(path).with_context(|| format!("cannot open cache {}", path.display()))?;
    println!("✓ Snapshot: {} readable", path.display());

    let report = validate(&engine)?;
    for (key, err) in &report.failures {
        println!("✗ {}: {err}", display_key(key));
    }
    if !report.failures.is_empty() {
        return Err(anyhow!("{} of {} resources failed validation", report.failures.len(), report.resources));
    }

    println!(
        "✓ States: {} resource{} decoded ({} complete)",
        report.resources,
        if report.resources == 1 { "" } else { "s" },
        report.complete
    );
    println!("✓ Blocks: {} present blocks verified", report.blocks);
    Ok(())
}

#[derive(Debug, Default)]
struct Report {
    resources: usize,
    complete: usize,
    blocks: usize,
    failures: Vec<(Vec<u8>, StateError)>,
}

fn validate(engine: &MemoryEngine) -> Result<Report> {
    let content = engine.collection(CONTENT_COLLECTION)?;
    let mut report = Report::default();

    for (key, value) in engine.entries(STATE_COLLECTION)? {
        report.resources += 1;
        match check_resource(content.as_ref(), &key, &value)? {
            Ok((state, blocks)) => {
                report.blocks += blocks;
                if state.is_complete()? {
                    report.complete += 1;
                }
            }
            Err(err) => report.failures.push((key, err)),
        }
    }
    Ok(report)
}

/// Check one resource. The outer error is a store failure that aborts the
/// whole run; the inner error is a problem with this resource only.
fn check_resource(
    content: &dyn KeyValueStore,
    key: &[u8],
    value: &[u8],
) -> Result<Result<(DownloadState, usize), StateError>> {
    let state = match DownloadState::decode(value) {
        Ok(state) => state,
        Err(err) => return Ok(Err(err)),
    };

    let mut blocks = 0;
    for (index, &present) in state.presence().iter().enumerate() {
        if !present {
            continue;
        }
        let id = u32::try_from(index).context("block id overflow")?;
        let Some(bytes) = content.get(&content_key(key, id))? else {
            return Ok(Err(StateError::MissingContent { block_id: id }));
        };
        let checked = Block::from_id(id, bytes).and_then(|block| state.check_block(id, block.length()));
        if let Err(err) = checked {
            return Ok(Err(err));
        }
        blocks += 1;
    }
    Ok(Ok((state, blocks)))
}

/// Show a `String` key as text, anything else as hex.
fn display_key(key: &[u8]) -> String {
    if let Some((len, text)) = key.split_first_chunk::<2>()
        && usize::from(u16::from_be_bytes(*len)) == text.len()
        && let Ok(text) = std::str::from_utf8(text)
    {
        return text.to_owned();
    }
    format!("0x{}", hex::encode(key))
}
