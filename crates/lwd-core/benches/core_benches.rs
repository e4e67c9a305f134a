//! Criterion benchmarks for lwd-core critical operations.
//!
//! Covers: full block decoding, compact projection, and header hashing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use prost::Message;

use lwd_core::block::Block;
use lwd_core::constants::SAPLING_VERSION_GROUP_ID;
use lwd_core::hash::{BlockHasher, DoubleSha256Hasher};
use lwd_core::header::BlockHeader;
use lwd_core::reader::write_compact_size;
use lwd_core::types::Hash256;

fn sample_header() -> BlockHeader {
    BlockHeader {
        version: 4,
        prev_hash: Hash256([0xAA; 32]),
        merkle_root: Hash256([0xBB; 32]),
        final_sapling_root: Hash256([0xCC; 32]),
        time: 1_700_000_000,
        bits: [0xff, 0xff, 0x07, 0x1f],
        nonce: [0x01; 32],
        solution: vec![0x5a; 1344],
    }
}

fn coinbase(height: u32) -> Vec<u8> {
    let mut tx = Vec::new();
    tx.extend_from_slice(&1u32.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&u32::MAX.to_le_bytes());
    tx.push(5);
    tx.push(4);
    tx.extend_from_slice(&height.to_le_bytes());
    tx.extend_from_slice(&u32::MAX.to_le_bytes());
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&0u32.to_le_bytes());
    tx
}

fn shielded_tx(spends: usize, outputs: usize) -> Vec<u8> {
    let mut tx = Vec::new();
    tx.extend_from_slice(&(4u32 | 1 << 31).to_le_bytes());
    tx.extend_from_slice(&SAPLING_VERSION_GROUP_ID.to_le_bytes());
    write_compact_size(&mut tx, 0);
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&[0u8; 8]);
    tx.extend_from_slice(&10_000i64.to_le_bytes());
    write_compact_size(&mut tx, spends as u64);
    tx.extend(std::iter::repeat_n(0x11, spends * 384));
    write_compact_size(&mut tx, outputs as u64);
    tx.extend(std::iter::repeat_n(0x22, outputs * 948));
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&[0u8; 64]);
    tx
}

/// A block with a coinbase and `n` two-in two-out shielded transactions.
fn sample_block(n: usize) -> Vec<u8> {
    let mut out = sample_header().encode();
    write_compact_size(&mut out, 1 + n as u64);
    out.extend_from_slice(&coinbase(1_000_000));
    for _ in 0..n {
        out.extend_from_slice(&shielded_tx(2, 2));
    }
    out
}

fn bench_block_decode(c: &mut Criterion) {
    let small = sample_block(1);
    let large = sample_block(100);

    c.bench_function("block_decode_1_tx", |b| {
        b.iter(|| Block::decode(black_box(&small)))
    });

    c.bench_function("block_decode_100_tx", |b| {
        b.iter(|| Block::decode(black_box(&large)))
    });
}

fn bench_compact_projection(c: &mut Criterion) {
    let block = Block::decode(&sample_block(100)).expect("decode failed");
    let compact = block.to_compact(&DoubleSha256Hasher).expect("projection failed");

    c.bench_function("compact_projection_100_tx", |b| {
        b.iter(|| black_box(&block).to_compact_at(&DoubleSha256Hasher, 1_000_000))
    });

    c.bench_function("compact_encode_100_tx", |b| {
        b.iter(|| black_box(&compact).encode_to_vec())
    });
}

fn bench_header_hash(c: &mut Criterion) {
    let header = sample_header().encode();

    c.bench_function("double_sha256_header_hash", |b| {
        b.iter(|| DoubleSha256Hasher.encodable_hash(black_box(&header), 1_000_000))
    });
}

criterion_group!(
    benches,
    bench_block_decode,
    bench_compact_projection,
    bench_header_hash,
);
criterion_main!(benches);
