//! Benchmarks for dataset construction
//!
//! Run with: cargo bench --package dataset

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use data_loader::{FeatureTable, FeatureWeight, Interaction};
use dataset::{train_test_split, DatasetBuilder};

fn synthetic_interactions(users: u32, items: u32) -> Vec<Interaction> {
    (0..users)
        .flat_map(|u| {
            (0..items)
                .filter(move |i| (u * 31 + i * 17) % 7 == 0)
                .map(move |i| Interaction {
                    user_id: u,
                    item_id: i,
                    rating: 1.0 + ((u + i) % 5) as f32,
                    timestamp: i64::from(u * items + i),
                })
        })
        .collect()
}

fn synthetic_features(entities: u32) -> FeatureTable {
    (0..entities)
        .map(|e| {
            let declared = (0..3)
                .map(|k| FeatureWeight {
                    feature_id: (e + k * 5) % 40,
                    weight: 1.0 + (k as f32),
                })
                .collect();
            (e, declared)
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let interactions = synthetic_interactions(2000, 500);
    let users = synthetic_features(2000);
    let items = synthetic_features(500);

    c.bench_function("build_dataset_with_features", |b| {
        b.iter(|| {
            let dataset = DatasetBuilder::new()
                .build(black_box(&interactions), Some(&users), Some(&items))
                .unwrap();
            black_box(dataset)
        })
    });
}

fn bench_split(c: &mut Criterion) {
    let interactions = synthetic_interactions(2000, 500);
    let dataset = DatasetBuilder::new()
        .with_features(false)
        .build(&interactions, None, None)
        .unwrap();

    c.bench_function("train_test_split", |b| {
        b.iter(|| black_box(train_test_split(black_box(&dataset.interactions), 0.2, 42).unwrap()))
    });
}

criterion_group!(benches, bench_build, bench_split);
criterion_main!(benches);
