//! Supervised GraphSAGE over weighted landmark graphs.
//!
//! `landsage` learns image descriptors for landmark retrieval: each node is an
//! image, its features come from a frozen descriptor table, and its
//! neighborhood is a weighted set of visually similar images. Stacked graph
//! encoders aggregate neighbor features by weighted mean and a linear head
//! trains the embedding with cross-entropy against landmark labels.
//!
//! # Modules
//!
//! - [`graph`]: Weighted neighbor sets and adjacency
//! - [`sampling`]: Seeded neighbor sampling with optional self-loop
//! - [`feature`]: Frozen feature table and layer inputs
//! - [`aggregator`]: Weighted-mean aggregation as a dense mask product
//! - [`encoder`]: One GraphSAGE layer
//! - [`model`]: Encoder stack plus classifier
//! - [`params`]: Named parameters, initialization and (partial) loading
//! - [`train`]: Mini-batch training loop
//! - [`embed`]: Batched embedding extraction
//! - [`retrieval`]: Similarity matrices and the mAP scorer seam
//! - [`dataset`], [`checkpoint`], [`config`]: Files on disk
//!
//! # Example
//!
//! ```rust,ignore
//! use landsage::{dataset::GraphData, model::SupervisedGraphSage, params::ParameterStore};
//!
//! let data = GraphData::load("data/landmarks", &device)?;
//! let store = ParameterStore::new(&device);
//! let model = SupervisedGraphSage::new(
//!     &config.model,
//!     data.features().clone(),
//!     data.adjacency().clone(),
//!     class_count,
//!     config.seed,
//!     store.var_builder(),
//! )?;
//! store.initialize(config.seed)?;
//! let (embedding, logits) = model.forward(&[0, 1, 2])?;  // (embed_dim, 3), (3, classes)
//! ```

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod embed;
pub mod encoder;
pub mod error;
pub mod feature;
pub mod graph;
pub mod model;
pub mod params;
pub mod retrieval;
pub mod sampling;
pub mod train;

pub use config::{ExperimentConfig, ModelConfig, OptimizerKind, TrainingConfig};
pub use error::{Error, Result};
pub use graph::{Adjacency, NodeId, WeightedNeighborSet};
pub use model::SupervisedGraphSage;
pub use params::ParameterStore;
