//! Single GraphSAGE encoder layer.
//!
//! ```text
//! z_i = ReLU(W * AGG({x_j : j in Sample(N(i))}))
//! ```
//!
//! In GCN mode the sampler adds each node to its own neighborhood, so the
//! node's feature is folded into the mean and no separate concatenation is
//! needed. In the default (concat) mode the aggregate is used as computed.
//!
//! Encoders stack by handing one encoder to the next as its
//! [`FeatureSource::Encoder`]. The lower encoder runs inside the upper one's
//! forward pass on the union of sampled neighbors, and every op stays on the
//! candle graph, so gradients reach the first layer's weight.

use std::sync::Arc;

use candle_core::{Device, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::aggregator::MeanAggregator;
use crate::error::Result;
use crate::feature::FeatureSource;
use crate::graph::{Adjacency, NodeId, WeightedNeighborSet};
use crate::sampling::{SampleCap, SharedRng, WeightedNeighborSampler};

/// Aggregator plus learned projection.
#[derive(Debug)]
pub struct GraphEncoder {
    aggregator: MeanAggregator,
    adjacency: Arc<Adjacency>,
    /// `out_dim x in_dim`, no bias.
    weight: Tensor,
    num_sample: SampleCap,
}

impl GraphEncoder {
    /// Create an encoder layer.
    ///
    /// # Arguments
    /// - `source`: features of the layer below (table or encoder)
    /// - `out_dim`: embedding dimension
    /// - `adjacency`: neighbor sets shared by all layers
    /// - `num_sample`: sampling cap, `None` for the full neighborhood
    /// - `gcn`: inject self-loops
    /// - `rng`: sampling source shared with the other layers
    /// - `vb`: variable builder; the weight is stored under `weight`
    pub fn new(
        source: FeatureSource,
        out_dim: usize,
        adjacency: Arc<Adjacency>,
        num_sample: SampleCap,
        gcn: bool,
        rng: SharedRng,
        vb: VarBuilder,
    ) -> Result<Self> {
        let in_dim = source.dim();
        let bound = (6.0 / (in_dim + out_dim) as f64).sqrt();
        let weight = vb.get_with_hints(
            (out_dim, in_dim),
            "weight",
            Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )?;
        let aggregator = MeanAggregator::new(source, WeightedNeighborSampler::new(gcn, rng));

        Ok(Self {
            aggregator,
            adjacency,
            weight,
            num_sample,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.aggregator.dim()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.dims()[0]
    }

    pub fn gcn(&self) -> bool {
        self.aggregator.sampler().self_loop()
    }

    pub fn num_sample(&self) -> SampleCap {
        self.num_sample
    }

    pub fn device(&self) -> &Device {
        self.weight.device()
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn aggregator(&self) -> &MeanAggregator {
        &self.aggregator
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    /// The encoder feeding this one, if any.
    pub fn lower(&self) -> Option<&GraphEncoder> {
        self.aggregator.source().encoder()
    }

    /// Number of encoder layers from the feature table up to this one.
    pub fn depth(&self) -> usize {
        1 + self.lower().map_or(0, GraphEncoder::depth)
    }

    fn neighbor_sets(&self, nodes: &[NodeId]) -> Result<Vec<&WeightedNeighborSet>> {
        nodes
            .iter()
            .map(|&node| self.adjacency.neighbors(node))
            .collect()
    }

    /// Neighborhood aggregate before projection.
    ///
    /// # Returns
    /// - `N x in_dim`
    pub fn aggregate(&self, nodes: &[NodeId]) -> Result<Tensor> {
        let sets = self.neighbor_sets(nodes)?;
        self.aggregator.aggregate(nodes, &sets, self.num_sample)
    }

    /// Forward pass.
    ///
    /// # Returns
    /// - `out_dim x N` embeddings (one column per node)
    pub fn encode(&self, nodes: &[NodeId]) -> Result<Tensor> {
        let agg = self.aggregate(nodes)?;
        Ok(self.weight.matmul(&agg.t()?)?.relu()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureTable;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn ring(n: usize) -> Arc<Adjacency> {
        let edges = (0..n as NodeId).flat_map(|i| {
            let next = (i + 1) % n as NodeId;
            [(i, next, 1.0), (next, i, 1.0)]
        });
        Arc::new(Adjacency::from_edges(n, edges).unwrap())
    }

    fn table(n: usize, dim: usize) -> FeatureSource {
        let data = (0..n * dim).map(|v| (v % 7) as f32 / 7.0).collect();
        FeatureSource::Table(FeatureTable::from_vec(data, n, dim, &Device::Cpu).unwrap())
    }

    #[test]
    fn test_encode_shape_is_transposed() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = GraphEncoder::new(
            table(6, 8),
            4,
            ring(6),
            Some(2),
            false,
            SharedRng::seed_from_u64(0),
            vb,
        )
        .unwrap();

        let out = enc.encode(&[0, 3, 5]).unwrap();
        assert_eq!(out.dims(), &[4, 3]);
        assert_eq!(enc.depth(), 1);
    }

    #[test]
    fn test_stacked_depth_and_dims() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let rng = SharedRng::seed_from_u64(0);
        let adj = ring(6);
        let first = GraphEncoder::new(
            table(6, 8),
            5,
            adj.clone(),
            None,
            true,
            rng.clone(),
            vb.pp("encoder_1"),
        )
        .unwrap();
        let second = GraphEncoder::new(
            FeatureSource::Encoder(Box::new(first)),
            3,
            adj,
            None,
            true,
            rng,
            vb.pp("encoder_2"),
        )
        .unwrap();

        assert_eq!(second.depth(), 2);
        assert_eq!(second.in_dim(), 5);
        assert_eq!(second.encode(&[1, 2]).unwrap().dims(), &[3, 2]);
    }

    #[test]
    fn test_output_is_non_negative() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = GraphEncoder::new(
            table(6, 8),
            16,
            ring(6),
            None,
            false,
            SharedRng::seed_from_u64(0),
            vb,
        )
        .unwrap();
        let out = enc.encode(&[0, 1, 2, 3, 4, 5]).unwrap();
        let min = out.flatten_all().unwrap().min(0).unwrap().to_scalar::<f32>().unwrap();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_unknown_node() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = GraphEncoder::new(
            table(6, 8),
            4,
            ring(6),
            None,
            false,
            SharedRng::seed_from_u64(0),
            vb,
        )
        .unwrap();
        assert!(matches!(
            enc.encode(&[6]),
            Err(crate::Error::NodeNotFound { node: 6, .. })
        ));
    }
}
