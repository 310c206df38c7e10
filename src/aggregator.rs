//! Weighted mean aggregation over sampled neighborhoods.
//!
//! For a batch of `N` query nodes:
//!
//! 1. sample each neighborhood (optionally with a self-loop)
//! 2. collect the union `U` of sampled neighbors
//! 3. build the `N x |U|` edge-weight matrix and normalize each row by its sum
//! 4. resolve `|U| x D` features and multiply
//!
//! ```text
//! h_i = sum_{j in S(i)} w_ij * x_j / sum_{j in S(i)} w_ij
//! ```
//!
//! # Complexity
//!
//! O(N * k + |U| * D) per call, with |U| <= N * k.

use std::collections::HashMap;

use candle_core::{Device, Tensor};

use crate::error::{Error, Result};
use crate::feature::FeatureSource;
use crate::graph::{NodeId, WeightedNeighborSet};
use crate::sampling::{SampleCap, WeightedNeighborSampler};

/// Per-call aggregation operator: unique neighbors plus the row-normalized
/// weight matrix. Dropped once the aggregate is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledBatch {
    unique_nodes: Vec<NodeId>,
    /// Row-major `rows x unique_nodes.len()`.
    weights: Vec<f32>,
    rows: usize,
}

impl SampledBatch {
    /// Build the operator for `nodes` from their already-sampled sets.
    ///
    /// Fails with [`Error::EmptyNeighborhood`] if a set is empty or its
    /// weights sum to zero.
    pub fn build(nodes: &[NodeId], sampled: &[WeightedNeighborSet]) -> Result<Self> {
        if nodes.len() != sampled.len() {
            return Err(Error::shape("sampled neighbor sets", nodes.len(), sampled.len()));
        }

        let mut index: HashMap<NodeId, usize> = HashMap::new();
        let mut unique_nodes = Vec::new();
        for set in sampled {
            for id in set.ids() {
                index.entry(id).or_insert_with(|| {
                    unique_nodes.push(id);
                    unique_nodes.len() - 1
                });
            }
        }

        let rows = nodes.len();
        let cols = unique_nodes.len();
        let mut weights = vec![0.0f32; rows * cols];
        for (i, (&node, set)) in nodes.iter().zip(sampled).enumerate() {
            let total = set.total_weight();
            if set.is_empty() || !total.is_finite() || total <= 0.0 {
                return Err(Error::EmptyNeighborhood { node });
            }
            let row = &mut weights[i * cols..(i + 1) * cols];
            for (id, w) in set.iter() {
                row[index[&id]] = (f64::from(w) / total) as f32;
            }
        }

        Ok(Self {
            unique_nodes,
            weights,
            rows,
        })
    }

    /// Neighbors referenced by the batch, in column order.
    pub fn unique_nodes(&self) -> &[NodeId] {
        &self.unique_nodes
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.unique_nodes.len()
    }

    /// Normalized weights of row `i`.
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.weights[i * cols..(i + 1) * cols]
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.weights, (self.rows, self.cols()), device)?)
    }
}

/// Weighted mean of sampled neighbor features.
#[derive(Debug)]
pub struct MeanAggregator {
    source: FeatureSource,
    sampler: WeightedNeighborSampler,
}

impl MeanAggregator {
    pub fn new(source: FeatureSource, sampler: WeightedNeighborSampler) -> Self {
        Self { source, sampler }
    }

    pub fn source(&self) -> &FeatureSource {
        &self.source
    }

    pub fn sampler(&self) -> &WeightedNeighborSampler {
        &self.sampler
    }

    /// Output feature width.
    pub fn dim(&self) -> usize {
        self.source.dim()
    }

    pub fn device(&self) -> &Device {
        self.source.device()
    }

    /// Aggregate features for `nodes`, where `neighbor_sets[i]` is the full
    /// neighborhood of `nodes[i]`.
    ///
    /// # Returns
    /// - `N x D` tensor, row `i` the weighted mean for `nodes[i]`
    pub fn aggregate(
        &self,
        nodes: &[NodeId],
        neighbor_sets: &[&WeightedNeighborSet],
        sample_cap: SampleCap,
    ) -> Result<Tensor> {
        if nodes.len() != neighbor_sets.len() {
            return Err(Error::shape("neighbor sets", nodes.len(), neighbor_sets.len()));
        }
        if nodes.is_empty() {
            return Err(Error::shape("aggregation batch (non-empty)", 1, 0));
        }

        let sampled = self.sampler.sample_batch(nodes, neighbor_sets, sample_cap);
        let batch = SampledBatch::build(nodes, &sampled)?;
        tracing::debug!(
            batch = batch.rows(),
            unique = batch.cols(),
            dim = self.dim(),
            "mean aggregation"
        );

        let mask = batch.to_tensor(self.device())?;
        let features = self.source.resolve(batch.unique_nodes())?;
        Ok(mask.matmul(&features)?)
    }
}
