//! Encoder benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use termframe::core::{CellGrid, PixelBuffer, Rgb};
use termframe::renderer::{CellEncoder, ColorDepth};

fn noise(width: u32, height: u32) -> PixelBuffer {
    let mut state = 0x2545_f491_u32;
    PixelBuffer::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb::new(r, g, b)
    })
    .unwrap()
}

fn bench_encode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder");

    // 640x480 display into a 160 column terminal
    let buffer = noise(640, 480);
    group.throughput(Throughput::Bytes(buffer.as_bytes().len() as u64));

    for (name, depth) in [
        ("truecolor_160", ColorDepth::TrueColor),
        ("ansi256_160", ColorDepth::Ansi256),
    ] {
        let encoder = CellEncoder::new(depth);
        group.bench_function(name, |b| {
            b.iter(|| black_box(encoder.encode(black_box(&buffer), 160).unwrap()))
        });
    }

    group.finish();
}

fn bench_sample_and_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder");

    let buffer = noise(1280, 720);
    let encoder = CellEncoder::new(ColorDepth::TrueColor).with_row_limit(Some(50));
    let size = encoder.fit(1280, 720, 200).unwrap();

    group.bench_function("sample_1280x720", |b| {
        b.iter(|| black_box(CellGrid::sample(black_box(&buffer), size)))
    });

    let grid = CellGrid::sample(&buffer, size);
    let mut out = Vec::new();
    group.bench_function("write_grid", |b| {
        b.iter(|| {
            out.clear();
            encoder.encode_grid(black_box(&grid), &mut out);
            black_box(out.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode_frame, bench_sample_and_write);
criterion_main!(benches);
