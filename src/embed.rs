//! Batched embedding extraction for retrieval.
//!
//! Runs the trained model over every node and stacks L2-normalized rows into
//! a `node_count x embed_dim` matrix for the external evaluator.

use candle_core::Tensor;

use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::model::SupervisedGraphSage;

/// Divide each row by its L2 norm.
pub fn l2_normalize_rows(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = (norm + 1e-12)?;
    Ok(x.broadcast_div(&norm)?)
}

fn node_batches(node_count: usize, batch_size: usize) -> Result<impl Iterator<Item = Vec<NodeId>>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".into()));
    }
    Ok((0..node_count)
        .step_by(batch_size)
        .map(move |start| (start..(start + batch_size).min(node_count)).map(|n| n as NodeId).collect()))
}

/// Embed every node of the model's graph.
///
/// `progress` is called with the number of nodes finished after each batch.
pub fn extract_embeddings(
    model: &SupervisedGraphSage,
    batch_size: usize,
    mut progress: impl FnMut(usize),
) -> Result<Tensor> {
    let mut rows = Vec::new();
    let mut done = 0;
    for nodes in node_batches(model.node_count(), batch_size)? {
        let (embedding, _) = model.forward(&nodes)?;
        rows.push(l2_normalize_rows(&embedding.t()?)?.detach());
        done += nodes.len();
        progress(done);
    }
    Ok(Tensor::cat(&rows, 0)?)
}

/// Parameter-free baseline: the first layer's weighted neighbor mean of the
/// raw features, L2-normalized.
pub fn mean_aggregate_features(
    model: &SupervisedGraphSage,
    batch_size: usize,
    mut progress: impl FnMut(usize),
) -> Result<Tensor> {
    let encoder = model.first_encoder();
    let mut rows = Vec::new();
    let mut done = 0;
    for nodes in node_batches(model.node_count(), batch_size)? {
        rows.push(l2_normalize_rows(&encoder.aggregate(&nodes)?)?.detach());
        done += nodes.len();
        progress(done);
    }
    Ok(Tensor::cat(&rows, 0)?)
}
