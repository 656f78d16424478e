//! Output Buffer Pool Performance Benchmark
//!
//! Measures the cost of pushing PCM through the slot semaphore with a device
//! that completes every buffer inside `submit`.
//!
//! **Goal:** Pool bookkeeping should be negligible next to decoding
//! **Target:** >1000x realtime for 44.1 kHz stereo

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gsnd_ap::audio::{NullDeviceFactory, PcmFormat};
use gsnd_ap::playback::{OutputBufferPool, PoolConfig};

/// One second of 44.1 kHz stereo s16le
const ONE_SECOND: usize = 44_100 * 2 * 2;

fn bench_pool_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_write");
    group.throughput(Throughput::Bytes(ONE_SECOND as u64));
    let pcm = vec![0x11u8; ONE_SECOND];

    for buffer_len in [512usize, 2048, 8192] {
        group.bench_with_input(BenchmarkId::from_parameter(buffer_len), &buffer_len, |b, &len| {
            let config = PoolConfig {
                buffer_count: 3,
                buffer_len: len,
            };
            let mut pool = OutputBufferPool::open(&NullDeviceFactory, config, PcmFormat::new(44100, 2))
                .expect("open pool");

            b.iter(|| {
                pool.write(black_box(&pcm)).expect("write");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_write);
criterion_main!(benches);
