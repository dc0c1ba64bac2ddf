//! # Dataset Crate
//!
//! Converts raw interaction and feature rows into the dense index space and
//! sparse matrices a trainable model consumes.
//!
//! ## Components
//!
//! - **index_space**: external id ↔ dense index bijection for one run
//! - **matrix**: sparse interaction and feature matrices, shared vocabulary
//! - **builder**: `DatasetBuilder` (minimum-data check, feature matrices)
//! - **split**: seeded train/test split and overlap detection
//!
//! ## Example Usage
//!
//! ```ignore
//! use dataset::{DatasetBuilder, train_test_split};
//!
//! let dataset = DatasetBuilder::new()
//!     .with_min_interactions(5)
//!     .with_features(true)
//!     .build_from_store(&store)?;
//! let (train, test) = train_test_split(&dataset.interactions, 0.2, 42)?;
//! ```

pub mod builder;
pub mod error;
pub mod index_space;
pub mod matrix;
pub mod split;

pub use builder::{Dataset, DatasetBuilder, DatasetStats, DEFAULT_MIN_INTERACTIONS};
pub use error::{DatasetError, Result};
pub use index_space::IndexSpace;
pub use matrix::{FeatureMatrix, FeatureVocabulary, InteractionMatrix};
pub use split::{overlap, train_test_split, DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION};
