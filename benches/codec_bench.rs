//! Performance benchmarks for IntLineCodec.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gondola_protocol::{HostCommand, IntLineCodec};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

/// One full pick cycle as printed by the firmware.
const DEVICE_CYCLE: &[u8] = b"0\r\n2\r\n4\r\n6\r\n8\r\n10\r\n";

fn bench_encode_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("host_command", |b| {
        b.iter(|| {
            let mut codec = IntLineCodec::new();
            let mut buffer = BytesMut::new();
            codec
                .encode(black_box(HostCommand::ConfirmGrab), &mut buffer)
                .unwrap();
            black_box(buffer);
        });
    });

    group.bench_function("position_id", |b| {
        b.iter(|| {
            let mut codec = IntLineCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(73_i64), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

fn bench_decode_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(6));

    group.bench_function("device_cycle", |b| {
        b.iter(|| {
            let mut codec = IntLineCodec::new();
            let mut buffer = BytesMut::from(black_box(DEVICE_CYCLE));
            while let Some(value) = codec.decode(&mut buffer).unwrap() {
                black_box(value);
            }
        });
    });

    group.finish();
}

/// Decoding a stream that arrives in small serial-sized chunks.
fn bench_decode_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_chunked");

    for chunk in [1usize, 2, 4, 8] {
        group.throughput(Throughput::Bytes(DEVICE_CYCLE.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut codec = IntLineCodec::new();
                let mut buffer = BytesMut::new();
                for piece in DEVICE_CYCLE.chunks(chunk) {
                    buffer.extend_from_slice(piece);
                    while let Some(value) = codec.decode(&mut buffer).unwrap() {
                        black_box(value);
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_command,
    bench_decode_cycle,
    bench_decode_chunked
);
criterion_main!(benches);
