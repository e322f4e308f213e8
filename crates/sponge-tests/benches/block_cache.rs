use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::TryStreamExt;
use sponge_orchestrator::Orchestrator;
use sponge_tests::{MemorySource, blocks_of, memory_cache, pattern};
use sponge_types::{BLOCK_SIZE, Block, Metadata, SourceProvider};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

const RESOURCE_SIZE: usize = 8 * BLOCK_SIZE as usize;

fn bench_write_blocks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let data = pattern(RESOURCE_SIZE);
    let blocks = blocks_of(&data);
    let key = "bench".to_owned();

    let mut group = c.benchmark_group("block_cache");
    group.throughput(Throughput::Bytes(RESOURCE_SIZE as u64));
    group.bench_function("write_8_blocks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cache = memory_cache();
                cache.write_metadata(&key, Metadata::known(RESOURCE_SIZE as u64), false).await.unwrap();
                for block in &blocks {
                    cache.write_content_block(&key, block, false).await.unwrap();
                }
            });
        });
    });

    let cache = memory_cache();
    rt.block_on(async {
        cache.write_metadata(&key, Metadata::known(RESOURCE_SIZE as u64), false).await.unwrap();
        for block in &blocks {
            cache.write_content_block(&key, block, false).await.unwrap();
        }
    });
    group.bench_function("read_8_blocks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let read: Vec<Block> = cache
                    .request_content(&key, &CancellationToken::new())
                    .try_collect()
                    .await
                    .unwrap();
                assert_eq!(read.len(), 8);
            });
        });
    });
    group.finish();
}

fn bench_orchestrated_fetch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let key = "bench".to_owned();

    let mut group = c.benchmark_group("orchestrator");
    group.throughput(Throughput::Bytes(RESOURCE_SIZE as u64));
    group.bench_function("cold_fetch_8_blocks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let orchestrator = Orchestrator::<String>::new();
                orchestrator.register_cache(memory_cache());
                orchestrator.register_source(Arc::new(
                    MemorySource::new().with_resource("bench", pattern(RESOURCE_SIZE)),
                ));
                let cancel = CancellationToken::new();
                orchestrator.request_metadata(&key, &cancel).await.unwrap();
                let read: Vec<Block> = orchestrator.request_content(&key, &cancel).try_collect().await.unwrap();
                assert_eq!(read.len(), 8);
            });
        });
    });
    group.finish();
}

criterion_group!(benches, bench_write_blocks, bench_orchestrated_fetch);
criterion_main!(benches);
