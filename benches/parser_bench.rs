//! Benchmarks for patch parsing and graph analysis
//!
//! Measures parse + analyze throughput on a representative patch.
//!
//! Run with: cargo bench --bench parser_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use patchkit::analyzer::analyze;
use patchkit::parser::parse;
use patchkit::serializer::serialize;

fn representative_patch() -> String {
    let mut src = String::from("#N canvas 0 50 900 700 12;\n");
    src.push_str("#X obj 20 20 r metro-bang;\n");
    for i in 0..32 {
        let y = 50 + i * 20;
        src.push_str(&format!("#X obj 20 {y} osc~ {};\n", 100.0 + i as f64 * 10.0));
        src.push_str(&format!("#X obj 120 {y} *~ 0.05;\n"));
    }
    src.push_str("#X obj 20 800 dac~;\n");
    let osc_count = 32usize;
    for i in 0..osc_count {
        let osc_idx = 1 + i * 2;
        let mult_idx = osc_idx + 1;
        src.push_str(&format!("#X connect {osc_idx} 0 {mult_idx} 0;\n"));
        let dac_idx = 1 + osc_count * 2;
        src.push_str(&format!("#X connect {mult_idx} 0 {dac_idx} 0;\n"));
        src.push_str(&format!("#X connect {mult_idx} 0 {dac_idx} 1;\n"));
    }
    src
}

fn bench_parse(c: &mut Criterion) {
    let src = representative_patch();
    c.bench_function("parse_representative_patch", |b| {
        b.iter(|| parse(black_box(&src)).unwrap());
    });
}

fn bench_serialize(c: &mut Criterion) {
    let src = representative_patch();
    let patch = parse(&src).unwrap();
    c.bench_function("serialize_representative_patch", |b| {
        b.iter(|| serialize(black_box(&patch)));
    });
}

fn bench_analyze(c: &mut Criterion) {
    let src = representative_patch();
    let patch = parse(&src).unwrap();
    c.bench_function("analyze_representative_patch", |b| {
        b.iter(|| analyze(black_box(&patch.root)));
    });
}

criterion_group!(benches, bench_parse, bench_serialize, bench_analyze);
criterion_main!(benches);
