use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use data_loader::{ItemId, UserId};
use models::{Algorithm, TrainParams};
use pipeline::RequestContext;
use registry::{PromotionResult, RunId, RunStatus, TrainingRun};
use server::{
    EngineConfig, Neighbour, OverlapScoring, Prediction, PredictionMode, RecommendationService, RunComparison,
    RunRanking, TrainingConfig,
};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// recsys - recommendation engine and model registry
#[derive(Parser)]
#[command(name = "recsys")]
#[command(about = "Train, promote and serve recommendation models", long_about = None)]
struct Cli {
    /// Directory with users.dat, items.dat, interactions.dat and feature files
    #[arg(short, long, default_value = "data/places")]
    data_dir: PathBuf,

    /// Directory holding registry.json and model artifacts
    #[arg(short, long, default_value = "registry")]
    registry_dir: PathBuf,

    /// Model family to train into and serve from
    #[arg(long, default_value = models::params::DEFAULT_FAMILY)]
    family: String,

    #[command(flatten)]
    serving: ServingArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServingArgs {
    /// Prediction timeout in milliseconds
    #[arg(long, default_value = "800")]
    timeout_ms: u64,

    /// Probability that a diverse request explores the catalog
    #[arg(long, default_value = "0.1")]
    exploration_rate: f64,

    /// Minimum ratings for an item to appear in the popularity fallback
    #[arg(long, default_value = "2")]
    popularity_min_count: u32,

    /// Cold-start overlap scoring: normalized or intensity-weighted
    #[arg(long, default_value = "normalized")]
    overlap: OverlapScoring,

    /// Seed for the exploration coin (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model, evaluate it and offer it for promotion
    Train {
        /// mf, knn or baseline
        #[arg(long, default_value = "mf")]
        algorithm: Algorithm,

        #[arg(long, default_value = "30")]
        epochs: usize,

        #[arg(long, default_value = "0.05")]
        learning_rate: f32,

        /// Embedding dimension for factorization
        #[arg(long, default_value = "30")]
        dim: usize,

        /// Neighbourhood size for knn
        #[arg(long, default_value = "20")]
        neighbours: usize,

        /// Train without user/item feature matrices
        #[arg(long)]
        no_features: bool,

        /// Refuse to train on fewer distinct interactions
        #[arg(long, default_value = "5")]
        min_interactions: usize,

        #[arg(long, default_value = "0.2")]
        test_fraction: f32,
    },

    /// Recommend items for a user
    Recommend {
        #[arg(long)]
        user_id: UserId,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// warm, cold-start, diverse or contextual
        #[arg(long, default_value = "warm")]
        mode: PredictionMode,

        /// Hour of day for contextual mode (0-23)
        #[arg(long)]
        hour: Option<u8>,

        /// Day of week for contextual mode (0 = Sunday)
        #[arg(long)]
        weekday: Option<u8>,

        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,

        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
    },

    /// Items whose learned vectors are closest to an item
    SimilarItems {
        #[arg(long)]
        item_id: ItemId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Users whose learned vectors are closest to a user
    SimilarUsers {
        #[arg(long)]
        user_id: UserId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Rank one user under two runs and show where they agree
    Compare {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        first: RunId,

        #[arg(long)]
        second: RunId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List every training run
    Runs,

    /// Show the active run of the family
    Active,

    /// Activate a run regardless of its metrics
    Promote {
        #[arg(long)]
        run_id: RunId,
    },

    /// Re-select the best completed run of the family
    PromoteBest,

    /// Record or overwrite a rating
    Rate {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        item_id: ItemId,

        /// 1.0 to 5.0
        #[arg(long)]
        rating: f32,
    },

    /// Check whether an item has enough signal to leave cold start
    Readiness {
        #[arg(long)]
        item_id: ItemId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut engine_config = EngineConfig::default()
        .with_family(cli.family.clone())
        .with_prediction_timeout(Duration::from_millis(cli.serving.timeout_ms))
        .with_exploration_rate(cli.serving.exploration_rate)
        .with_popularity_min_count(cli.serving.popularity_min_count)
        .with_overlap_scoring(cli.serving.overlap);
    if let Some(seed) = cli.serving.seed {
        engine_config = engine_config.with_rng_seed(seed);
    }

    let training_config = match &cli.command {
        Commands::Train {
            min_interactions,
            test_fraction,
            ..
        } => TrainingConfig::default()
            .with_min_interactions(*min_interactions)
            .with_test_fraction(*test_fraction),
        _ => TrainingConfig::default(),
    };

    let start = Instant::now();
    let service = RecommendationService::open(&cli.data_dir, &cli.registry_dir, engine_config, training_config)
        .with_context(|| format!("Failed to open data in {}", cli.data_dir.display()))?;
    println!("{} Loaded {} in {:?}", "✓".green(), cli.data_dir.display(), start.elapsed());

    match cli.command {
        Commands::Train {
            algorithm,
            epochs,
            learning_rate,
            dim,
            neighbours,
            no_features,
            ..
        } => {
            let params = TrainParams::new(algorithm)
                .with_family(cli.family)
                .with_epochs(epochs)
                .with_learning_rate(learning_rate)
                .with_embedding_dim(dim)
                .with_neighbours(neighbours)
                .with_features(!no_features);
            handle_train(&service, params).await?
        }
        Commands::Recommend {
            user_id,
            limit,
            mode,
            hour,
            weekday,
            latitude,
            longitude,
        } => {
            let mut context = RequestContext::new();
            context.hour = hour.map(|h| h % 24);
            context.weekday = weekday.map(|d| d % 7);
            if let (Some(lat), Some(lon)) = (latitude, longitude) {
                context = context.with_location(lat, lon);
            }
            let prediction = service.predict(user_id, limit, mode, Some(context)).await?;
            print_prediction(&service, user_id, &prediction);
        }
        Commands::SimilarItems { item_id, limit } => {
            let neighbours = service.similar_items(item_id, limit).await?;
            print_neighbours(&format!("Items similar to {}", item_id), &neighbours, |id| {
                service.item_name(id)
            });
        }
        Commands::SimilarUsers { user_id, limit } => {
            let neighbours = service.similar_users(user_id, limit).await?;
            print_neighbours(&format!("Users similar to {}", user_id), &neighbours, |_| None);
        }
        Commands::Compare {
            user_id,
            first,
            second,
            limit,
        } => {
            let comparison = service.compare_runs(user_id, limit, first, second).await?;
            print_comparison(&service, &comparison);
        }
        Commands::Runs => {
            let runs = service.list_runs().await?;
            let active = service.get_active_run().await?.map(|r| r.id);
            println!("{}", format!("{} training runs", runs.len()).bold().blue());
            for run in &runs {
                print_run(run, Some(run.id) == active);
            }
        }
        Commands::Active => match service.get_active_run().await? {
            Some(run) => print_run(&run, true),
            None => println!("No active model for family '{}'", service.family()),
        },
        Commands::Promote { run_id } => {
            let result = service.force_promote(run_id).await?;
            print_promotion(&result);
        }
        Commands::PromoteBest => match service.promote_best().await? {
            Some(result) => print_promotion(&result),
            None => println!("No completed run in family '{}'", service.family()),
        },
        Commands::Rate {
            user_id,
            item_id,
            rating,
        } => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("System clock is before 1970")?
                .as_secs() as i64;
            match service.upsert_interaction(user_id, item_id, rating, timestamp).await? {
                Some(previous) => println!(
                    "{} User {} re-rated item {}: {} → {}",
                    "✓".green(),
                    user_id,
                    item_id,
                    previous.rating,
                    rating
                ),
                None => println!("{} User {} rated item {}: {}", "✓".green(), user_id, item_id, rating),
            }
        }
        Commands::Readiness { item_id } => {
            let readiness = service.item_readiness(item_id).await?;
            let verdict = if readiness.ready {
                "ready".green()
            } else {
                "cold".yellow()
            };
            println!("{}", format!("Item {}: {}", item_id, verdict).bold());
            println!("{}Declared features: {}", "• ".cyan(), readiness.feature_count);
            println!("{}Interactions: {}", "• ".cyan(), readiness.interaction_count);
            println!("{}In active model: {}", "• ".cyan(), readiness.in_model);
        }
    }

    Ok(())
}

async fn handle_train(service: &RecommendationService, params: TrainParams) -> Result<()> {
    println!("Training {} (family '{}')...", params.algorithm, params.family);
    let start = Instant::now();
    let outcome = service.train(params).await.context("Training failed")?;
    println!("{} Trained in {:?}", "✓".green(), start.elapsed());

    print_run(&outcome.run, outcome.promotion.is_promoted());
    print_promotion(&outcome.promotion);
    Ok(())
}

fn print_prediction(service: &RecommendationService, user_id: UserId, prediction: &Prediction) {
    println!(
        "{}",
        format!(
            "Recommendations for user {} ({} via {})",
            user_id, prediction.mode, prediction.strategy
        )
        .bold()
        .blue()
    );
    if prediction.items.is_empty() {
        println!("  nothing to recommend yet");
        return;
    }
    for (rank, item) in prediction.items.iter().enumerate() {
        let name = service.item_name(item.item_id).unwrap_or_default();
        println!(
            "{}. {} {} - Score: {:.3}",
            (rank + 1).to_string().green(),
            item.item_id,
            name,
            item.score
        );
    }
}

fn print_comparison(service: &RecommendationService, comparison: &RunComparison) {
    println!(
        "{}",
        format!("Run comparison for user {}", comparison.user_id).bold().blue()
    );
    for ranking in [&comparison.first, &comparison.second] {
        print_ranking(service, ranking, &comparison.common);
    }
    println!(
        "{}In common: {} ({:.1}%)",
        "• ".cyan(),
        comparison.common.len(),
        comparison.overlap_percent
    );
}

fn print_ranking(service: &RecommendationService, ranking: &RunRanking, common: &[ItemId]) {
    println!("{} {} ({})", "Run".bold(), ranking.run_id, ranking.algorithm);
    for (rank, item) in ranking.items.iter().enumerate() {
        let name = service.item_name(item.item_id).unwrap_or_default();
        let marker = if common.contains(&item.item_id) { "=".green() } else { " ".normal() };
        println!(
            "  {}{}. {} {} - Score: {:.3}",
            marker,
            (rank + 1).to_string().green(),
            item.item_id,
            name,
            item.score
        );
    }
}

fn print_neighbours(title: &str, neighbours: &[Neighbour], name: impl Fn(u32) -> Option<String>) {
    println!("{}", title.bold().blue());
    for (rank, n) in neighbours.iter().enumerate() {
        println!(
            "{}. {} {} - Similarity: {:.3}",
            (rank + 1).to_string().green(),
            n.id,
            name(n.id).unwrap_or_default(),
            n.similarity
        );
    }
}

fn print_run(run: &TrainingRun, active: bool) {
    let status = match run.status {
        RunStatus::Completed => run.status.to_string().green(),
        RunStatus::Running => run.status.to_string().yellow(),
        RunStatus::Failed => run.status.to_string().red(),
    };
    let marker = if active { "*".bold().green() } else { " ".normal() };
    println!(
        "{} {} [{}] {} {} {}",
        marker,
        run.id,
        run.family,
        run.params.algorithm,
        status,
        run.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    for (name, value) in &run.metrics {
        println!("    {}: {:.4}", name, value);
    }
    if let Some(reason) = &run.degraded {
        println!("    {} {}", "degraded:".yellow(), reason);
    }
    if let Some(reason) = &run.failure {
        println!("    {} {}", "failed:".red(), reason);
    }
}

fn print_promotion(result: &PromotionResult) {
    match result {
        PromotionResult::Promoted {
            run_id,
            version,
            previous,
            reason,
        } => {
            println!("{} Promoted {} as version {} ({})", "✓".green(), run_id, version, reason);
            if let Some(previous) = previous {
                println!("  replaced {}", previous);
            }
        }
        PromotionResult::Rejected { run_id, active, reason } => {
            println!("{} Kept {} inactive ({})", "✗".yellow(), run_id, reason);
            if let Some(active) = active {
                println!("  active run is still {}", active);
            }
        }
    }
}
