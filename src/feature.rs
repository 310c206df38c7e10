//! Feature sources for aggregation.
//!
//! An aggregator needs one feature row per unique neighbor. The first encoder
//! reads them from the frozen [`FeatureTable`]; a deeper encoder reads them
//! from the encoder below it. Both sit behind [`FeatureSource::resolve`], and
//! the encoder variant keeps the candle graph intact so the loss
//! backpropagates into lower layers.

use candle_core::{Device, Tensor};

use crate::encoder::GraphEncoder;
use crate::error::{Error, Result};
use crate::graph::NodeId;

/// Dense `node_count x dim` lookup table of input features.
///
/// Stored as a plain tensor, never as a trainable variable.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    table: Tensor,
}

impl FeatureTable {
    /// Wrap a rank-2 tensor (rows = nodes).
    pub fn new(table: Tensor) -> Result<Self> {
        let rank = table.rank();
        if rank != 2 {
            return Err(Error::shape("feature table rank", 2, rank));
        }
        Ok(Self {
            table: table.detach(),
        })
    }

    /// Build a table from row-major data.
    pub fn from_vec(data: Vec<f32>, node_count: usize, dim: usize, device: &Device) -> Result<Self> {
        if data.len() != node_count * dim {
            return Err(Error::shape("feature table data", node_count * dim, data.len()));
        }
        Self::new(Tensor::from_vec(data, (node_count, dim), device)?)
    }

    pub fn node_count(&self) -> usize {
        self.table.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.table.dims()[1]
    }

    pub fn device(&self) -> &Device {
        self.table.device()
    }

    pub fn as_tensor(&self) -> &Tensor {
        &self.table
    }

    /// Gather the rows of `nodes`, in order.
    pub fn lookup(&self, nodes: &[NodeId]) -> Result<Tensor> {
        let node_count = self.node_count();
        if let Some(&node) = nodes.iter().find(|&&n| n as usize >= node_count) {
            return Err(Error::NodeNotFound { node, node_count });
        }
        let ids = Tensor::from_slice(nodes, nodes.len(), self.table.device())?;
        Ok(self.table.index_select(&ids, 0)?)
    }
}

/// Where an aggregator gets neighbor features from.
#[derive(Debug)]
pub enum FeatureSource {
    /// Frozen input features.
    Table(FeatureTable),
    /// Embeddings computed by the encoder one layer down.
    Encoder(Box<GraphEncoder>),
}

impl FeatureSource {
    /// Resolve features for `nodes` as an `N x dim` tensor.
    pub fn resolve(&self, nodes: &[NodeId]) -> Result<Tensor> {
        match self {
            Self::Table(table) => table.lookup(nodes),
            // encoders emit dim x N
            Self::Encoder(encoder) => Ok(encoder.encode(nodes)?.t()?.contiguous()?),
        }
    }

    /// Feature width produced by [`resolve`](Self::resolve).
    pub fn dim(&self) -> usize {
        match self {
            Self::Table(table) => table.dim(),
            Self::Encoder(encoder) => encoder.out_dim(),
        }
    }

    pub fn device(&self) -> &Device {
        match self {
            Self::Table(table) => table.device(),
            Self::Encoder(encoder) => encoder.device(),
        }
    }

    /// The encoder below, if this source is one.
    pub fn encoder(&self) -> Option<&GraphEncoder> {
        match self {
            Self::Table(_) => None,
            Self::Encoder(encoder) => Some(&**encoder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FeatureTable {
        FeatureTable::from_vec(vec![1., 0., 0., 1., 2., 2.], 3, 2, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_lookup_preserves_order() {
        let rows = table().lookup(&[2, 0]).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rows, vec![vec![2., 2.], vec![1., 0.]]);
    }

    #[test]
    fn test_lookup_out_of_range() {
        let err = table().lookup(&[0, 3]).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound { node: 3, node_count: 3 }));
    }

    #[test]
    fn test_rank_checked() {
        let flat = Tensor::zeros(4, candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            FeatureTable::new(flat),
            Err(Error::ShapeMismatch { expected: 2, got: 1, .. })
        ));
    }
}
