//! Performance benchmarks for the decoder's hot paths.
//!
//! The Huffman symbol loop and the block-delimiter scan dominate decode
//! time; both are benchmarked against synthetic bit streams so no
//! compressed fixtures are required.

use bzsplit_core::bitstream::BitReader;
use bzsplit_decoder::huffman::DecodeTable;
use bzsplit_decoder::marker;
use bzsplit_decoder::position::PositionTracker;
use bzsplit_decoder::{BLOCK_DELIMITER, DELIMITER_BITS};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Cursor;

/// Generate reproducible pseudo-random data.
fn random(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed: u64 = 0x123456789ABCDEF0;
    for _ in 0..size {
        // Linear congruential generator
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((seed >> 32) as u8);
    }
    data
}

/// Pack fixed-width symbols MSB-first.
fn pack_symbols(symbols: &[u16], width: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let mut acc = 0u64;
    let mut live = 0u32;
    for &sym in symbols {
        acc = (acc << width) | u64::from(sym);
        live += width;
        while live >= 8 {
            live -= 8;
            out.push((acc >> live) as u8);
        }
    }
    if live > 0 {
        out.push((acc << (8 - live)) as u8);
    }
    out
}

fn bench_huffman_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("huffman_build");

    for &alpha_size in &[16usize, 64, 258] {
        // Flat lengths: the widest valid table of that size.
        let mut width = 1u8;
        while (1usize << width) < alpha_size {
            width += 1;
        }
        let lengths = vec![width; alpha_size];

        group.bench_with_input(
            BenchmarkId::from_parameter(alpha_size),
            &lengths,
            |b, lengths| {
                b.iter(|| {
                    let table = DecodeTable::build(black_box(lengths)).unwrap();
                    black_box(table);
                });
            },
        );
    }

    group.finish();
}

fn bench_huffman_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("huffman_decode");

    let alpha_size = 258usize;
    let width = 9u32;
    let lengths = vec![width as u8; alpha_size];
    let table = DecodeTable::build(&lengths).unwrap();

    let count = 100_000usize;
    let symbols: Vec<u16> = random(count)
        .into_iter()
        .map(|b| u16::from(b) % alpha_size as u16)
        .collect();
    let packed = pack_symbols(&symbols, width);

    group.throughput(Throughput::Elements(count as u64));
    group.bench_with_input(
        BenchmarkId::from_parameter("100k_symbols"),
        &packed,
        |b, packed| {
            b.iter(|| {
                let mut reader = BitReader::new(Cursor::new(black_box(packed).clone()));
                for _ in 0..count {
                    black_box(table.decode_symbol(&mut reader).unwrap());
                }
            });
        },
    );

    group.finish();
}

fn bench_marker_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("marker_scan");

    for (name, size) in [("16KB", 16 * 1024), ("256KB", 256 * 1024)] {
        let mut data = random(size);
        // Plant the delimiter at the very end so the scan covers it all.
        data.extend_from_slice(&[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| {
                let mut reader = BitReader::new(Cursor::new(black_box(data).clone()));
                let mut pos = PositionTracker::new();
                let found =
                    marker::scan_to_marker(&mut reader, &mut pos, BLOCK_DELIMITER, DELIMITER_BITS)
                        .unwrap();
                black_box((found, pos.reported()));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_huffman_build,
    bench_huffman_decode,
    bench_marker_scan
);
criterion_main!(benches);
