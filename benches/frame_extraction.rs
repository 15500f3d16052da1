//! Criterion benchmarks for the reader loop hot path.
//!
//! - Frame extraction over realistic telemetry streams, whole and in small chunks
//! - Telemetry parsing and narrowing to half precision
//!
//! Run with: cargo bench --bench frame_extraction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensor_bridge::protocol::{FrameExtractor, SensorSample};

fn telemetry_stream(frames: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..frames {
        if i % 50 == 0 {
            stream.extend_from_slice(b"\x00noise");
        }
        stream.extend_from_slice(format!("${}.25,{}.5,{}.125\n", i % 100, i % 40, i % 7).as_bytes());
    }
    stream
}

/// Extraction throughput for different read sizes.
///
/// Serial reads rarely line up with frame boundaries; small chunks exercise the
/// carry-over path.
fn frame_extraction_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_extraction");
    let stream = telemetry_stream(1000);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [1usize, 16, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut extractor = FrameExtractor::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += extractor.push(black_box(piece)).len();
                }
                count
            });
        });
    }

    group.finish();
}

fn telemetry_parse(c: &mut Criterion) {
    c.bench_function("telemetry_parse", |b| {
        b.iter(|| SensorSample::parse(black_box("12.3,45.6,78.9"), 1_718_000_000));
    });
}

criterion_group!(benches, frame_extraction_throughput, telemetry_parse);
criterion_main!(benches);
