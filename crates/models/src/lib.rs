//! # Models Crate
//!
//! The pluggable "trainable model" capability and everything around it.
//!
//! ## Components
//!
//! - **model**: `TrainableModel` (fit) and `Recommender` (score, vectors),
//!   plus the serializable `FittedModel` snapshot
//! - **factorization**: hybrid matrix factorization with feature embeddings
//! - **knn**: item-based nearest neighbours
//! - **baseline**: damped item mean, no vector representations
//! - **factory**: `ModelFactory` mapping `Algorithm` to constructors
//! - **evaluation**: `Evaluator` for precision/recall@k, AUC, MRR, F1@k
//!
//! ## Example Usage
//!
//! ```ignore
//! use models::{Algorithm, Evaluator, ModelFactory, TrainParams};
//!
//! let params = TrainParams::new(Algorithm::ItemKnn).with_neighbours(10);
//! let model = ModelFactory::with_defaults().fit(&params, &train, None, None)?;
//! let report = Evaluator::new().evaluate(&model, &train, &test)?;
//! ```

pub mod baseline;
pub mod error;
pub mod evaluation;
pub mod factorization;
pub mod factory;
pub mod knn;
pub mod model;
pub mod params;

pub use baseline::{BaselineModel, BaselineTrainer};
pub use error::{ModelError, Result};
pub use evaluation::{EVALUATION_WARNING, EvaluationReport, Evaluator, Metrics, TEST_AUC, TEST_PRECISION_AT_10};
pub use factorization::{FactorizationModel, FactorizationTrainer};
pub use factory::ModelFactory;
pub use knn::{ItemKnnTrainer, KnnModel};
pub use model::{FittedModel, Recommender, TrainableModel};
pub use params::{Algorithm, TrainParams};
