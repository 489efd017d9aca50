//! Benchmarks for core TEL operations: canonicalization, hashing, tree
//! construction, path generation, verification, and proof serialization.

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tel_core::{
    build_root, canonicalize, content_hash, hash_pair, inclusion_proof, verify_proof,
    IntegrityEngine, MerkleTree, SecretKey,
};
use tel_types::{Digest, InclusionProof, OwnerId, WindowKey};

fn make_leaf(i: usize) -> Digest {
    content_hash(&format!("record number {}", i))
}

fn window() -> WindowKey {
    WindowKey::parse("2024-05-01").unwrap()
}

fn bench_canonicalize(c: &mut Criterion) {
    let text = "Line one\r\nLine two \u{FB01}\rLine three\n".repeat(64);
    c.bench_function("canonicalize_3kb", |b| b.iter(|| canonicalize(&text)));
}

fn bench_hash_operations(c: &mut Criterion) {
    let engine = IntegrityEngine::new(SecretKey::new("bench-secret").unwrap());
    let owner = OwnerId::new("bench-owner").unwrap();
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let d1 = make_leaf(1);
    let d2 = make_leaf(2);

    c.bench_function("content_hash", |b| {
        b.iter(|| content_hash("a short text record"));
    });

    c.bench_function("seal", |b| {
        b.iter(|| engine.seal("a short text record", &created_at, &owner));
    });

    c.bench_function("hash_pair", |b| {
        b.iter(|| hash_pair(&d1, &d2));
    });
}

fn bench_tree_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_construction");

    for size in [1, 10, 100, 1000, 10000] {
        let leaves: Vec<Digest> = (0..size).map(make_leaf).collect();
        group.bench_with_input(BenchmarkId::new("leaves", size), &leaves, |b, leaves| {
            b.iter(|| build_root(leaves));
        });
    }
    group.finish();
}

fn bench_path_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_generation");

    for size in [10, 100, 1000, 10000] {
        let leaves: Vec<Digest> = (0..size).map(make_leaf).collect();
        let tree = MerkleTree::from_leaves(leaves).unwrap();

        group.bench_with_input(BenchmarkId::new("leaves", size), &size, |b, &size| {
            b.iter(|| tree.generate_path(size / 2).unwrap());
        });
    }
    group.finish();
}

fn bench_verification(c: &mut Criterion) {
    let leaves: Vec<Digest> = (0..1000).map(make_leaf).collect();
    let proof = inclusion_proof(window(), &leaves, 777).unwrap();

    c.bench_function("verify_proof_1000_leaves", |b| {
        b.iter(|| verify_proof(&proof).unwrap());
    });
}

fn bench_serialization(c: &mut Criterion) {
    let leaves: Vec<Digest> = (0..1000).map(make_leaf).collect();
    let proof = inclusion_proof(window(), &leaves, 42).unwrap();
    let json = serde_json::to_string(&proof).unwrap();

    c.bench_function("proof_serialize_json", |b| {
        b.iter(|| serde_json::to_string(&proof).unwrap());
    });

    c.bench_function("proof_deserialize_json", |b| {
        b.iter(|| serde_json::from_str::<InclusionProof>(&json).unwrap());
    });
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_hash_operations,
    bench_tree_construction,
    bench_path_generation,
    bench_verification,
    bench_serialization,
);
criterion_main!(benches);
