//! # Data Loader Crate
//!
//! The interaction store: users, items, the shared feature vocabulary,
//! declared feature intensities and the implicit-feedback interaction log.
//!
//! ## Main Components
//!
//! - **types**: Domain types and the `InteractionStore` / `FeatureSource` API
//! - **parser**: Parse and write the `::`-delimited `.dat` files
//! - **index**: Load a directory into a validated store
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{FeatureSource, InteractionStore};
//! use std::path::Path;
//!
//! let mut store = InteractionStore::load_from_files(Path::new("data/places"))?;
//! store.upsert_interaction(1, 10, 4.0, 1_700_000_000)?;
//! let declared = store.user_features(1);
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod types;

pub use error::{DataLoadError, Result};
pub use index::load_item_places;
pub use types::{
    // Type aliases
    FeatureId,
    FeatureTable,
    ItemId,
    UserId,
    // Core types
    Feature,
    FeatureSource,
    FeatureWeight,
    Interaction,
    InteractionStore,
    Item,
    ItemPlace,
    ItemStats,
    User,
    MAX_WEIGHT,
    MIN_WEIGHT,
};
