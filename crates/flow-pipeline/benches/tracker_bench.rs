//! SequenceGapTracker 핫패스 벤치마크
//!
//! observe()는 모든 데이터그램마다 호출되는 경로이므로 락 경합과
//! 키 조회 비용을 추적합니다.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use flowgate_flow_pipeline::{SequenceGapTracker, SourceKey};

fn bench_contiguous_stream(c: &mut Criterion) {
    let tracker = SequenceGapTracker::new(1000);
    let key = SourceKey::new("192.0.2.1|0/0");
    tracker.observe(&key, 0, 0);

    let mut sequence = 0u32;
    c.bench_function("observe_contiguous_single_key", |b| {
        b.iter(|| {
            sequence = sequence.wrapping_add(30);
            black_box(tracker.observe(&key, sequence, 30))
        })
    });
}

fn bench_many_keys(c: &mut Criterion) {
    let tracker = SequenceGapTracker::new(1000);
    let keys: Vec<SourceKey> = (0..1024)
        .map(|i| SourceKey::new(format!("10.0.{}.{}|0/0", i / 256, i % 256)))
        .collect();
    for key in &keys {
        tracker.observe(key, 0, 0);
    }

    let mut i = 0usize;
    c.bench_function("observe_rotating_1024_keys", |b| {
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(tracker.observe(&keys[i], 1000, 30))
        })
    });
}

criterion_group!(benches, bench_contiguous_stream, bench_many_keys);
criterion_main!(benches);
