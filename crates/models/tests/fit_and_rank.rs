//! End-to-end: dataset → factory fit → ranking → evaluation.

use data_loader::Interaction;
use dataset::{DatasetBuilder, train_test_split};
use models::{Algorithm, Evaluator, FittedModel, ModelFactory, Recommender, TrainParams};

fn example_rows() -> Vec<Interaction> {
    [(1, 10, 5.0), (1, 11, 3.0), (2, 10, 4.0), (2, 11, 5.0), (2, 12, 2.0)]
        .into_iter()
        .enumerate()
        .map(|(t, (user_id, item_id, rating))| Interaction {
            user_id,
            item_id,
            rating,
            timestamp: t as i64,
        })
        .collect()
}

fn fit(algorithm: Algorithm) -> (dataset::Dataset, FittedModel) {
    let dataset = DatasetBuilder::new()
        .with_features(false)
        .build(&example_rows(), None, None)
        .unwrap();
    let params = TrainParams::new(algorithm).with_features(false);
    let model = ModelFactory::with_defaults()
        .fit(&params, &dataset.interactions, None, None)
        .unwrap();
    (dataset, model)
}

#[test]
fn denser_item_ranks_first_for_neighbourhood_and_baseline() {
    for algorithm in [Algorithm::ItemKnn, Algorithm::Baseline] {
        let (dataset, model) = fit(algorithm);
        let user = dataset.index.user_index(1).unwrap();
        let i10 = dataset.index.item_index(10).unwrap();
        let i11 = dataset.index.item_index(11).unwrap();

        let scores = model.score(user, &[i10, i11]).unwrap();
        assert!(scores[0] >= scores[1], "{algorithm}: {scores:?}");
    }
}

#[test]
fn scoring_is_repeatable() {
    for algorithm in Algorithm::ALL {
        let (_, model) = fit(algorithm);
        assert_eq!(model.score_all(0).unwrap(), model.score_all(0).unwrap());
    }
}

#[test]
fn fitted_model_survives_serialization() {
    let (_, model) = fit(Algorithm::ItemKnn);
    let json = serde_json::to_string(&model).unwrap();
    assert!(json.contains("\"algorithm\":\"item_knn\""));

    let restored: FittedModel = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.algorithm(), Algorithm::ItemKnn);
    let before = model.score_all(1).unwrap();
    let after = restored.score_all(1).unwrap();
    for (a, b) in before.iter().zip(&after) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn evaluation_on_split_reports_core_metrics() {
    let rows: Vec<Interaction> = (0..30u32)
        .flat_map(|u| {
            (0..12u32).filter(move |i| (u + i) % 3 == 0).map(move |i| Interaction {
                user_id: u,
                item_id: i,
                rating: 1.0 + ((u * i) % 5) as f32,
                timestamp: i64::from(u * 12 + i),
            })
        })
        .collect();
    let dataset = DatasetBuilder::new().with_features(false).build(&rows, None, None).unwrap();
    let (train, test) = train_test_split(&dataset.interactions, 0.2, 42).unwrap();

    let params = TrainParams::new(Algorithm::ItemKnn);
    let model = ModelFactory::with_defaults().fit(&params, &train, None, None).unwrap();
    let report = Evaluator::new().evaluate(&model, &train, &test).unwrap();

    assert!(!report.is_degraded());
    for name in ["test_precision_at_10", "test_recall_at_5", "test_auc", "test_mrr", "train_auc"] {
        let value = report.metric(name).unwrap();
        assert!((0.0..=1.0).contains(&value), "{name} = {value}");
    }
}
