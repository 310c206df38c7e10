//! Supervised GraphSAGE: encoder stack plus a linear classifier head.
//!
//! ```text
//! z = Encoder_L( ... Encoder_1(x) )      (embed_dim x N)
//! logits = z^T W_c^T + b_c               (N x class_count)
//! loss = CE(logits, labels)
//! ```
//!
//! The embedding `z` is what retrieval consumes; the classifier only shapes
//! it during training.

use std::sync::Arc;

use candle_core::{Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

use crate::config::ModelConfig;
use crate::encoder::GraphEncoder;
use crate::error::{Error, Result};
use crate::feature::{FeatureSource, FeatureTable};
use crate::graph::{Adjacency, NodeId};
use crate::sampling::SharedRng;

/// Encoder stack and classifier head.
pub struct SupervisedGraphSage {
    encoder: GraphEncoder,
    classifier: Linear,
    class_count: usize,
    rng: SharedRng,
}

impl SupervisedGraphSage {
    /// Build the model, registering its parameters through `vb`.
    ///
    /// Encoder `i` (1-based) stores its weight under `encoder_{i}.weight`;
    /// the head uses `classifier.weight` and `classifier.bias`. Sampling for
    /// every layer draws from one generator seeded with `seed`.
    pub fn new(
        config: &ModelConfig,
        features: FeatureTable,
        adjacency: Arc<Adjacency>,
        class_count: usize,
        seed: u64,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        if features.dim() != config.feat_dim {
            return Err(Error::shape("feature dimension", config.feat_dim, features.dim()));
        }
        if features.node_count() != adjacency.node_count() {
            return Err(Error::shape(
                "adjacency node count",
                features.node_count(),
                adjacency.node_count(),
            ));
        }
        if class_count == 0 {
            return Err(Error::InvalidConfig("class_count must be positive".into()));
        }

        let rng = SharedRng::seed_from_u64(seed);
        let (&top_dim, lower_dims) = config
            .embed_dims
            .split_last()
            .ok_or_else(|| Error::InvalidConfig("embed_dims is empty".into()))?;

        let mut source = FeatureSource::Table(features);
        for (layer, &dim) in lower_dims.iter().enumerate() {
            let encoder = GraphEncoder::new(
                source,
                dim,
                adjacency.clone(),
                config.num_sample,
                config.gcn,
                rng.clone(),
                vb.pp(format!("encoder_{}", layer + 1)),
            )?;
            source = FeatureSource::Encoder(Box::new(encoder));
        }
        let encoder = GraphEncoder::new(
            source,
            top_dim,
            adjacency,
            config.num_sample,
            config.gcn,
            rng.clone(),
            vb.pp(format!("encoder_{}", lower_dims.len() + 1)),
        )?;
        let classifier = linear(top_dim, class_count, vb.pp("classifier"))?;

        Ok(Self {
            encoder,
            classifier,
            class_count,
            rng,
        })
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn embed_dim(&self) -> usize {
        self.encoder.out_dim()
    }

    pub fn node_count(&self) -> usize {
        self.encoder.adjacency().node_count()
    }

    /// Top encoder.
    pub fn encoder(&self) -> &GraphEncoder {
        &self.encoder
    }

    /// Encoders from the feature table upward.
    pub fn encoders(&self) -> Vec<&GraphEncoder> {
        let mut layers = vec![&self.encoder];
        while let Some(lower) = layers.last().copied().and_then(GraphEncoder::lower) {
            layers.push(lower);
        }
        layers.reverse();
        layers
    }

    /// Encoder reading the frozen feature table.
    pub fn first_encoder(&self) -> &GraphEncoder {
        let mut encoder = &self.encoder;
        while let Some(lower) = encoder.lower() {
            encoder = lower;
        }
        encoder
    }

    /// Checkpoint keys of every parameter, bottom layer first.
    pub fn parameter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = (1..=self.encoder.depth())
            .map(|i| format!("encoder_{i}.weight"))
            .collect();
        keys.push("classifier.weight".into());
        keys.push("classifier.bias".into());
        keys
    }

    /// Reset the sampling generator shared by every layer.
    pub fn reseed(&self, seed: u64) {
        self.rng.reseed(seed);
    }

    /// Forward pass.
    ///
    /// # Returns
    /// - embeddings, `embed_dim x N`
    /// - logits, `N x class_count`
    pub fn forward(&self, nodes: &[NodeId]) -> Result<(Tensor, Tensor)> {
        let embedding = self.encoder.encode(nodes)?;
        let logits = self.classifier.forward(&embedding.t()?.contiguous()?)?;
        Ok((embedding, logits))
    }

    /// Cross-entropy between the logits for `nodes` and `labels`.
    ///
    /// Fails with [`Error::ShapeMismatch`] when the label count differs from
    /// the node count or the batch is empty.
    pub fn loss(&self, nodes: &[NodeId], labels: &[u32]) -> Result<Tensor> {
        if labels.len() != nodes.len() {
            return Err(Error::shape("label batch", nodes.len(), labels.len()));
        }
        if labels.is_empty() {
            return Err(Error::shape("label batch (non-empty)", 1, 0));
        }
        if let Some(&label) = labels.iter().find(|&&l| l as usize >= self.class_count) {
            return Err(Error::InvalidLabel {
                label,
                class_count: self.class_count,
            });
        }

        let (_, logits) = self.forward(nodes)?;
        let target = Tensor::from_slice(labels, labels.len(), logits.device())?;
        Ok(candle_nn::loss::cross_entropy(&logits, &target)?)
    }

    /// Predicted class per node.
    pub fn predict(&self, nodes: &[NodeId]) -> Result<Vec<u32>> {
        let (_, logits) = self.forward(nodes)?;
        Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterStore;
    use candle_core::Device;

    fn setup(dims: Vec<usize>) -> (ParameterStore, SupervisedGraphSage) {
        let n = 8;
        let features = FeatureTable::from_vec(
            (0..n * 4).map(|v| ((v * 3) % 5) as f32).collect(),
            n,
            4,
            &Device::Cpu,
        )
        .unwrap();
        let edges = (0..n as NodeId).map(|i| (i, (i + 1) % n as NodeId, 1.0));
        let adjacency = Arc::new(Adjacency::from_edges(n, edges).unwrap());
        let config = ModelConfig::default()
            .with_feat_dim(4)
            .with_embed_dims(dims)
            .with_num_sample(Some(3));

        let store = ParameterStore::new(&Device::Cpu);
        let model =
            SupervisedGraphSage::new(&config, features, adjacency, 3, 0, store.var_builder())
                .unwrap();
        store.initialize(0).unwrap();
        (store, model)
    }

    #[test]
    fn test_forward_shapes() {
        let (_, model) = setup(vec![6, 5]);
        let (embedding, logits) = model.forward(&[0, 1, 2]).unwrap();
        assert_eq!(embedding.dims(), &[5, 3]);
        assert_eq!(logits.dims(), &[3, 3]);
    }

    #[test]
    fn test_parameter_keys_match_store() {
        let (store, model) = setup(vec![6, 5]);
        let mut keys = model.parameter_keys();
        keys.sort();
        assert_eq!(keys, store.names());
        assert_eq!(model.encoders().len(), 2);
        assert_eq!(model.first_encoder().in_dim(), 4);
    }

    #[test]
    fn test_single_layer() {
        let (store, model) = setup(vec![6]);
        assert_eq!(model.encoders().len(), 1);
        assert_eq!(
            store.names(),
            vec!["classifier.bias", "classifier.weight", "encoder_1.weight"]
        );
    }

    #[test]
    fn test_loss_is_finite_scalar() {
        let (_, model) = setup(vec![6, 5]);
        let loss = model.loss(&[0, 1, 2, 3], &[0, 1, 2, 0]).unwrap();
        assert_eq!(loss.rank(), 0);
        assert!(loss.to_scalar::<f32>().unwrap().is_finite());
    }

    #[test]
    fn test_loss_label_errors() {
        let (_, model) = setup(vec![6]);
        assert!(matches!(
            model.loss(&[0, 1], &[0]),
            Err(Error::ShapeMismatch { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            model.loss(&[], &[]),
            Err(Error::ShapeMismatch { got: 0, .. })
        ));
        assert!(matches!(
            model.loss(&[0], &[3]),
            Err(Error::InvalidLabel { label: 3, class_count: 3 })
        ));
    }

    #[test]
    fn test_out_of_range_node() {
        let (_, model) = setup(vec![6]);
        assert!(matches!(
            model.forward(&[8]),
            Err(Error::NodeNotFound { node: 8, .. })
        ));
    }
}
