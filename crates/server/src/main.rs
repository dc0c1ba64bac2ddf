//! Test harness for the recommendation service.
//!
//! Trains on a data directory, then prints a recommendation for a few users
//! in every mode.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use models::{Algorithm, TrainParams};
use pipeline::RequestContext;
use server::{EngineConfig, PredictionMode, RecommendationService, TrainingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server=debug,registry=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "data/places".to_string()));
    let registry_dir = PathBuf::from(args.next().unwrap_or_else(|| "target/registry".to_string()));

    info!("Starting recommendation harness on {:?}", data_dir);
    let service = RecommendationService::open(
        &data_dir,
        &registry_dir,
        EngineConfig::default(),
        TrainingConfig::default(),
    )
    .context("Failed to open service")?;

    for algorithm in Algorithm::ALL {
        let outcome = service
            .train(TrainParams::new(algorithm).with_epochs(20))
            .await
            .with_context(|| format!("Training {} failed", algorithm))?;
        info!(
            run_id = %outcome.run.id,
            precision = outcome.run.metric("test_precision_at_10").unwrap_or(0.0),
            promoted = outcome.promotion.is_promoted(),
            "Trained {}",
            algorithm
        );
    }

    let context = RequestContext::new().with_time(20, 5);
    for user_id in [1, 2, 5] {
        for mode in [
            PredictionMode::Warm,
            PredictionMode::ColdStart,
            PredictionMode::Diverse,
            PredictionMode::Contextual,
        ] {
            match service.predict(user_id, 5, mode, Some(context)).await {
                Ok(prediction) => {
                    let ids: Vec<String> = prediction
                        .items
                        .iter()
                        .map(|s| format!("{}:{:.3}", s.item_id, s.score))
                        .collect();
                    info!("user {} [{} via {}] {}", user_id, mode, prediction.strategy, ids.join(" "));
                }
                Err(e) => info!("user {} [{}] failed: {}", user_id, mode, e),
            }
        }
    }

    Ok(())
}
