//! Benchmarks for the metric index
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use metric_index::index::{IndexConfig, MemoryIndex};
use metric_index::metric::MetricDefinition;
use metric_index::rules::{IndexRule, IndexRules};
use std::time::Duration;

fn create_test_defs(count: usize) -> Vec<MetricDefinition> {
    (0..count)
        .map(|i| {
            MetricDefinition::new(format!("servers.host{}.cpu.core{}", i / 8, i % 8), 1, 10)
                .tag("dc", if i % 2 == 0 { "east" } else { "west" })
                .tag("host", format!("host{}", i / 8))
                .last_update(i as i64)
        })
        .collect()
}

fn populated(defs: &[MetricDefinition], config: IndexConfig) -> MemoryIndex {
    let index = MemoryIndex::new(config);
    index.load(defs.iter().cloned());
    index
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");

    for size in [1_000, 10_000] {
        let defs = create_test_defs(size);
        group.throughput(Throughput::Elements(size as u64));

        for tag_support in [true, false] {
            group.bench_function(format!("add_{}_tags_{}", size, tag_support), |b| {
                b.iter_batched(
                    || {
                        MemoryIndex::new(IndexConfig {
                            tag_support,
                            ..IndexConfig::default()
                        })
                    },
                    |index| {
                        for def in &defs {
                            index.add(def.key(), def.clone(), 0).unwrap();
                        }
                        index
                    },
                    BatchSize::LargeInput,
                )
            });
        }
    }

    group.bench_function("re_add_existing", |b| {
        let defs = create_test_defs(1_000);
        let index = populated(&defs, IndexConfig::default());
        let def = defs[500].clone();
        let key = def.key();

        b.iter(|| index.add(black_box(key), def.clone(), 1).unwrap());
    });

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    let defs = create_test_defs(10_000);
    let index = populated(&defs, IndexConfig::default());

    for pattern in ["servers.*", "servers.host1*.cpu.core[0-3]", "servers.{host1,host2}.cpu.*"] {
        group.bench_function(pattern, |b| {
            b.iter(|| index.find(1, black_box(pattern), 0).unwrap())
        });
    }

    let scan = populated(
        &defs,
        IndexConfig {
            tag_support: false,
            ..IndexConfig::default()
        },
    );
    for (label, idx) in [("tag_index", &index), ("tag_scan", &scan)] {
        group.bench_function(format!("find_by_tag_{}", label), |b| {
            b.iter(|| {
                idx.find_by_tag(1, black_box(&["dc=east", "host=~host1"]), 0)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");
    let defs = create_test_defs(10_000);

    group.throughput(Throughput::Elements(defs.len() as u64));
    group.bench_function("delete_subtree_10000", |b| {
        b.iter_batched(
            || populated(&defs, IndexConfig::default()),
            |index| index.delete(1, black_box("servers")).unwrap(),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");
    let defs = create_test_defs(10_000);
    let config = IndexConfig {
        rules: IndexRules::new(
            Vec::new(),
            IndexRule::catch_all("default", Duration::from_secs(5_000)),
        ),
        ..IndexConfig::default()
    };
    // half the series are older than the budget
    let now = Utc.timestamp_opt(10_000, 0).unwrap();

    group.throughput(Throughput::Elements(defs.len() as u64));
    group.bench_function("prune_half_10000", |b| {
        b.iter_batched(
            || populated(&defs, config.clone()),
            |index| index.prune(black_box(now)),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_add, bench_find, bench_delete, bench_prune);
criterion_main!(benches);
