//! Hooks for retrieval evaluation.
//!
//! Mean average precision against ground truth is computed elsewhere; this
//! module only defines the seam ([`RetrievalScorer`]) and the similarity
//! matrix handed across it.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// External mAP scorer over a query-by-database similarity matrix.
pub trait RetrievalScorer {
    /// Mean average precision for `similarity` (`N x N`, higher = closer).
    fn mean_average_precision(&self, similarity: &Tensor) -> Result<f64>;
}

/// Dot-product similarity `F * F^T` of row features.
///
/// For L2-normalized rows this is cosine similarity.
pub fn similarity_matrix(features: &Tensor) -> Result<Tensor> {
    let rank = features.rank();
    if rank != 2 {
        return Err(Error::shape("feature matrix rank", 2, rank));
    }
    Ok(features.matmul(&features.t()?)?)
}

/// Baseline vs learned features on one benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalComparison {
    pub base_map: f64,
    pub new_map: f64,
    pub improvement: f64,
}

/// Score `base` and `learned` features with `scorer`.
pub fn compare_retrieval(
    scorer: &dyn RetrievalScorer,
    base: &Tensor,
    learned: &Tensor,
) -> Result<RetrievalComparison> {
    let base_sim = similarity_matrix(base)?;
    let learned_sim = similarity_matrix(learned)?;
    let (base_nodes, learned_nodes) = (base.dims()[0], learned.dims()[0]);
    if base_nodes != learned_nodes {
        return Err(Error::shape("retrieval node count", base_nodes, learned_nodes));
    }
    let base_map = scorer.mean_average_precision(&base_sim)?;
    let new_map = scorer.mean_average_precision(&learned_sim)?;
    let comparison = RetrievalComparison {
        base_map,
        new_map,
        improvement: new_map - base_map,
    };
    tracing::info!(
        base = format!("{base_map:.4}"),
        new = format!("{new_map:.4}"),
        improvement = format!("{:.4}", comparison.improvement),
        "retrieval comparison"
    );
    Ok(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// Mean of the diagonal: stands in for a real mAP scorer.
    struct DiagonalScorer;

    impl RetrievalScorer for DiagonalScorer {
        fn mean_average_precision(&self, similarity: &Tensor) -> Result<f64> {
            let rows = similarity.to_vec2::<f32>()?;
            let diag: f32 = rows.iter().enumerate().map(|(i, r)| r[i]).sum();
            Ok(f64::from(diag) / rows.len() as f64)
        }
    }

    #[test]
    fn test_similarity_matrix() {
        let f = Tensor::from_vec(vec![1f32, 0., 0., 1.], (2, 2), &Device::Cpu).unwrap();
        let s = similarity_matrix(&f).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(s, vec![vec![1., 0.], vec![0., 1.]]);
    }

    #[test]
    fn test_compare_retrieval() {
        let base = Tensor::from_vec(vec![0.5f32, 0., 0., 0.5], (2, 2), &Device::Cpu).unwrap();
        let learned = Tensor::from_vec(vec![1f32, 0., 0., 1.], (2, 2), &Device::Cpu).unwrap();
        let cmp = compare_retrieval(&DiagonalScorer, &base, &learned).unwrap();
        assert_eq!(cmp.base_map, 0.25);
        assert_eq!(cmp.new_map, 1.0);
        assert_eq!(cmp.improvement, 0.75);
    }

    #[test]
    fn test_compare_rejects_bad_shapes() {
        let scalar = Tensor::new(1f32, &Device::Cpu).unwrap();
        assert!(matches!(
            compare_retrieval(&DiagonalScorer, &scalar, &scalar),
            Err(Error::ShapeMismatch { expected: 2, got: 0, .. })
        ));

        let three = Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        let two = Tensor::zeros((2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            compare_retrieval(&DiagonalScorer, &three, &two),
            Err(Error::ShapeMismatch { expected: 3, got: 2, .. })
        ));
    }
}
