//! Бенчмарки декодирования видео и navdata.
//!
//! Запуск: cargo bench --bench decode_bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dronelink_codec::{
    decode_level_bits, decode_navdata, decode_picture, decode_run_bits,
    fixtures::{BlockSpec, DemoFields, MacroblockSpec, NavdataBuilder, PictureBuilder},
    idct, AtCommand, DecoderConfig, VideoDecoder, WordOrder, BLOCK_SIZE, LEVEL_TABLE_SIZE,
    RUN_TABLE_SIZE,
};
use dronelink_types::PictureFormat;

/// Макроблок с несколькими AC-коэффициентами в каждом блоке.
fn textured_macroblock(seed: u16) -> MacroblockSpec {
    let block = |i: u16| {
        BlockSpec::with_ac(
            (seed * 7 + i * 31) % 1024,
            vec![(0, 12), (1, -7), (0, 3), (4, -2), (2, 1)],
        )
    };

    MacroblockSpec::Coded {
        blocks: [block(0), block(1), block(2), block(3), block(4), block(5)],
    }
}

fn textured_picture(
    format: PictureFormat,
    resolution: u8,
) -> Vec<u8> {
    let (width, height) = format.dimensions(resolution).unwrap_or_default();
    let (slices, per_slice) = (height as usize / 16, width as usize / 16);

    let mut builder = PictureBuilder::new(format, resolution);
    for slice in 0..slices {
        for index in 0..per_slice {
            builder = builder.set(slice, index, textured_macroblock((slice * 13 + index) as u16));
        }
    }

    builder.build()
}

fn bench_tables(c: &mut Criterion) {
    let mut group = c.benchmark_group("tables");

    group.bench_function("run_table_build", |b| {
        b.iter(|| {
            (0..RUN_TABLE_SIZE as u32)
                .map(decode_run_bits)
                .fold(0u32, |acc, e| acc.wrapping_add(u32::from(e.len)))
        })
    });

    group.bench_function("level_table_build", |b| {
        b.iter(|| {
            (0..LEVEL_TABLE_SIZE as u32)
                .map(decode_level_bits)
                .fold(0i32, |acc, e| acc.wrapping_add(i32::from(e.value)))
        })
    });

    group.finish();
}

fn bench_idct(c: &mut Criterion) {
    let mut coeffs = [0i32; BLOCK_SIZE];
    for (i, c) in coeffs.iter_mut().enumerate().take(12) {
        *c = (i as i32 * 37 % 200) - 100;
    }

    c.bench_function("idct_8x8", |b| b.iter(|| idct(black_box(&coeffs))));
}

fn bench_picture(c: &mut Criterion) {
    let mut group = c.benchmark_group("picture");

    for (name, format, resolution) in [
        ("cif", PictureFormat::Cif, 1u8),
        ("qvga", PictureFormat::Qvga, 1),
        ("qvga_x2", PictureFormat::Qvga, 2),
    ] {
        let data = textured_picture(format, resolution);
        let (width, height) = format.dimensions(resolution).unwrap_or_default();
        group.throughput(Throughput::Elements(u64::from(width) * u64::from(height)));

        group.bench_with_input(BenchmarkId::new("decode_picture", name), &data, |b, data| {
            b.iter(|| decode_picture(black_box(data), WordOrder::BigEndian))
        });

        let mut decoder = VideoDecoder::new(DecoderConfig::default());
        group.bench_with_input(BenchmarkId::new("video_decoder", name), &data, |b, data| {
            b.iter(|| decoder.decode(black_box(data)))
        });
    }

    let skipped = PictureBuilder::new(PictureFormat::Qvga, 2).build();
    group.bench_function("decode_picture/qvga_x2_skipped", |b| {
        b.iter(|| decode_picture(black_box(&skipped), WordOrder::BigEndian))
    });

    group.finish();
}

fn bench_navdata(c: &mut Criterion) {
    let datagram = NavdataBuilder::new(0x0001_0001, 1234)
        .demo(DemoFields {
            battery: 80,
            theta: 1500.0,
            phi: -300.0,
            psi: 90_000.0,
            altitude: 1200,
            ..DemoFields::default()
        })
        .option(16, vec![0u8; 64])
        .checksum()
        .build();

    c.bench_function("decode_navdata", |b| {
        b.iter(|| decode_navdata(black_box(&datagram)))
    });

    let command = AtCommand::movement(true, -0.25, 0.5, 0.0, 0.1);
    c.bench_function("encode_pcmd", |b| b.iter(|| black_box(&command).encode(42)));
}

criterion_group!(benches, bench_tables, bench_idct, bench_picture, bench_navdata);
criterion_main!(benches);
