//! Benchmarks for webstack core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use webstack::backend::simulated::SimulatedCloud;
use webstack::core::{codegen, executor, parser, planner, resolver, topology};
use webstack::tripwire::hasher;

const STACK: &str = r#"
version: "1.0"
stack: bench-stack
prefix: bench
region: us-east-1
webserver:
  key_name: bench-key
database:
  allocated_storage_gb: 20
"#;

fn bench_blake3_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_string");
    for size in [64, 256, 1024, 4096] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(hasher::hash_string(black_box(input))));
        });
    }
    group.finish();
}

fn bench_yaml_parse(c: &mut Criterion) {
    c.bench_function("yaml_parse", |b| {
        b.iter(|| black_box(parser::parse_config(black_box(STACK)).unwrap()));
    });
}

fn bench_build_topology(c: &mut Criterion) {
    let config = parser::parse_config(STACK).unwrap();
    c.bench_function("build_topology", |b| {
        b.iter(|| black_box(topology::load_topology(black_box(&config)).unwrap()));
    });
}

fn bench_plan(c: &mut Criterion) {
    let config = parser::parse_config(STACK).unwrap();
    let (_, topo) = topology::load_topology(&config).unwrap();
    c.bench_function("topo_sort_and_plan", |b| {
        b.iter(|| {
            let order = resolver::build_execution_order(black_box(&topo)).unwrap();
            black_box(planner::plan(&topo, &order, None))
        });
    });
}

fn bench_manifest_hash(c: &mut Criterion) {
    let config = parser::parse_config(STACK).unwrap();
    let (_, topo) = topology::load_topology(&config).unwrap();
    let order = resolver::build_execution_order(&topo).unwrap();
    let manifest = codegen::render_manifest(&topo, &order);
    c.bench_function("manifest_hash_json", |b| {
        b.iter(|| black_box(hasher::hash_json(black_box(&manifest))));
    });
}

fn bench_apply_simulated(c: &mut Criterion) {
    let config = parser::parse_config(STACK).unwrap();
    let (config, topo) = topology::load_topology(&config).unwrap();
    c.bench_function("apply_simulated", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            let mut cloud = SimulatedCloud::default();
            let cfg = executor::ApplyConfig {
                config: &config,
                topology: &topo,
                state_dir: dir.path(),
                force: false,
                dry_run: false,
                resource_filter: None,
            };
            black_box(executor::apply(&cfg, &mut cloud).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_blake3_string,
    bench_yaml_parse,
    bench_build_topology,
    bench_plan,
    bench_manifest_hash,
    bench_apply_simulated
);
criterion_main!(benches);
