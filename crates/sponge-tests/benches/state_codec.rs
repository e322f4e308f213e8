use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sponge_types::{BLOCK_SIZE, DownloadState};
use sponge_wire::snapshot::{SnapshotRecord, decode_snapshot, encode_snapshot};

/// A half-downloaded state of `blocks` blocks.
fn half_present(blocks: u32) -> DownloadState {
    let mut state = DownloadState::new(Some(u64::from(blocks) * u64::from(BLOCK_SIZE))).unwrap();
    for id in (0..blocks).step_by(2) {
        state.mark_present(id).unwrap();
    }
    state
}

fn bench_state_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_codec");

    for blocks in [16, 1024, 65_536] {
        let state = half_present(blocks);
        let encoded = state.encode().unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", blocks), &state, |b, s| {
            b.iter(|| s.encode().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode", blocks), &encoded, |b, e| {
            b.iter(|| DownloadState::decode(e).unwrap());
        });
    }

    group.finish();
}

fn bench_mark_present(c: &mut Criterion) {
    c.bench_function("mark_present_and_encode", |b| {
        let state = half_present(1024);
        b.iter(|| {
            let mut state = state.clone();
            state.mark_present(511).unwrap();
            state.encode().unwrap()
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let records: Vec<SnapshotRecord> = (0..1000u32)
        .map(|i| SnapshotRecord {
            collection: "download-state".to_owned(),
            key: format!("resource/{i}").into_bytes(),
            value: half_present(64).encode().unwrap(),
        })
        .collect();
    let encoded = encode_snapshot(&records).unwrap();

    let mut group = c.benchmark_group("snapshot");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_1000_records", |b| {
        b.iter(|| encode_snapshot(&records).unwrap());
    });
    group.bench_function("decode_1000_records", |b| {
        b.iter(|| decode_snapshot(&encoded).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_state_codec, bench_mark_present, bench_snapshot);
criterion_main!(benches);
