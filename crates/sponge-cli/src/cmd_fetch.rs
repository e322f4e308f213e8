/// Implementation of `sponge fetch`.
///
/// Opens the cache snapshot, registers it as the only cache provider and
/// the source directory as the only source, then streams the resource to
/// stdout (or `--output`). The snapshot is written back before exiting,
/// so blocks fetched from the source are served from the cache next time.
///
/// ```text
///   sponge fetch KEY
///        │
///        ▼
///   Orchestrator ── cache hit ──▶ cache.spg ──▶ stdout
///        │
///      miss
///        ▼
///   DirectorySource ──▶ write to cache ──▶ stdout
/// ```
///
/// Ctrl-C cancels the request; the partial download stays in the cache
/// and is completed by the next fetch.
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use futures::TryStreamExt;
use sponge_cache::{BlockCache, MemoryEngine};
use sponge_orchestrator::Orchestrator;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::FetchArgs;
use crate::config::SpongeConfig;
use crate::source_dir::DirectorySource;

/// Run the `sponge fetch` command.
///
/// # Errors
///
/// Returns an error if the cache file cannot be opened or written, the
/// resource is unknown, a provider fails, or the output cannot be
/// written.
pub async fn run(args: &FetchArgs, config: &SpongeConfig) -> Result<()> {
    let engine = MemoryEngine::open(&config.cache_file)
        .with_context(|| format!("cannot open cache {}", config.cache_file.display()))?;
    let cache = Arc::new(BlockCache::open(Arc::new(engine))?.with_predicate(config.should_cache()));

    let orchestrator = Orchestrator::new();
    orchestrator.register_cache(cache.clone());
    orchestrator.register_source(Arc::new(DirectorySource::new(&config.source_dir)));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = fetch(&orchestrator, args, &cancel).await;
    interrupt.abort();

    // Persist whatever was fetched, even after a failure.
    cache
        .close()
        .with_context(|| format!("cannot write cache {}", config.cache_file.display()))?;
    let written = outcome?;

    if cancel.is_cancelled() {
        bail!("interrupted after {written} bytes");
    }
    info!(key = %args.key, bytes = written, "fetch complete");
    Ok(())
}

async fn fetch(orchestrator: &Orchestrator<String>, args: &FetchArgs, cancel: &CancellationToken) -> Result<u64> {
    let key = &args.key;
    let metadata = orchestrator
        .request_metadata(key, cancel)
        .await
        .with_context(|| format!("cannot fetch metadata of {key}"))?
        .ok_or_else(|| anyhow!("{key}: not found in the cache or the source directory"))?;

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut content = orchestrator.request_content(key, cancel);
    let mut written = 0u64;
    while let Some(block) = content
        .try_next()
        .await
        .with_context(|| format!("cannot fetch content of {key}"))?
    {
        out.write_all(block.bytes()).await.context("cannot write output")?;
        written += u64::from(block.length());
    }
    out.flush().await.context("cannot write output")?;

    if let Some(size) = metadata.size
        && written != size
        && !cancel.is_cancelled()
    {
        bail!("{key}: received {written} bytes, expected {size}");
    }
    Ok(written)
}
