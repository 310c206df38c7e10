//! Property-based tests for sampling and aggregation.
//!
//! These tests verify invariants that should hold for any neighborhood:
//! - Sampled neighbors are a subset of the full neighborhood
//! - Small neighborhoods are returned whole
//! - GCN mode always includes the node itself
//! - Aggregation rows are convex combinations, independent of input order

use proptest::prelude::*;
use std::collections::BTreeMap;

use landsage::graph::{NodeId, WeightedNeighborSet};

/// Neighborhoods over node ids `0..50` with unique ids and positive weights.
fn arb_neighbors() -> impl Strategy<Value = BTreeMap<NodeId, f32>> {
    prop::collection::btree_map(0u32..50, 0.1f32..10.0, 1..20)
}

fn to_set(map: &BTreeMap<NodeId, f32>) -> WeightedNeighborSet {
    map.iter().map(|(&id, &w)| (id, w)).collect()
}

mod sampling_props {
    use super::*;
    use landsage::sampling::WeightedNeighborSampler;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn sample_is_subset_with_bounded_size(
            neighbors in arb_neighbors(),
            cap in 1usize..25,
            seed in any::<u64>(),
        ) {
            let set = to_set(&neighbors);
            let sampler = WeightedNeighborSampler::seeded(false, seed);
            let sampled = sampler.sample(99, &set, Some(cap));

            prop_assert_eq!(sampled.len(), cap.min(set.len()));
            prop_assert!(sampled.is_subset_of(&set));
            for (id, w) in sampled.iter() {
                prop_assert_eq!(set.weight(id), Some(w), "weight of {} changed", id);
            }
        }

        #[test]
        fn small_neighborhood_returned_whole(
            neighbors in arb_neighbors(),
            extra in 0usize..5,
            seed in any::<u64>(),
        ) {
            let set = to_set(&neighbors);
            let sampler = WeightedNeighborSampler::seeded(false, seed);

            let capped = sampler.sample(99, &set, Some(set.len() + extra));
            prop_assert_eq!(&capped, &set);
            let uncapped = sampler.sample(99, &set, None);
            prop_assert_eq!(&uncapped, &set);
        }

        #[test]
        fn gcn_sample_contains_self(
            neighbors in arb_neighbors(),
            node in 0u32..60,
            cap in prop::option::of(1usize..25),
            seed in any::<u64>(),
        ) {
            let set = to_set(&neighbors);
            let sampler = WeightedNeighborSampler::seeded(true, seed);
            let sampled = sampler.sample(node, &set, cap);

            prop_assert_eq!(sampled.weight(node), Some(1.0));
            prop_assert!(sampled.len() <= cap.unwrap_or(set.len()).min(set.len()) + 1);
        }

        #[test]
        fn same_seed_same_sample(
            neighbors in arb_neighbors(),
            cap in 1usize..5,
            seed in any::<u64>(),
        ) {
            let set = to_set(&neighbors);
            let a = WeightedNeighborSampler::seeded(false, seed);
            let b = WeightedNeighborSampler::seeded(false, seed);
            for _ in 0..5 {
                prop_assert_eq!(a.sample(0, &set, Some(cap)), b.sample(0, &set, Some(cap)));
            }
        }
    }
}

mod aggregation_props {
    use super::*;
    use candle_core::Device;
    use landsage::aggregator::{MeanAggregator, SampledBatch};
    use landsage::feature::{FeatureSource, FeatureTable};
    use landsage::sampling::WeightedNeighborSampler;

    const NODES: usize = 50;
    const DIM: usize = 3;

    fn feature(node: NodeId, d: usize) -> f32 {
        ((node as usize * 7 + d * 3) % 11) as f32 - 5.0
    }

    fn aggregator() -> MeanAggregator {
        let data = (0..NODES as NodeId)
            .flat_map(|n| (0..DIM).map(move |d| feature(n, d)))
            .collect();
        let table = FeatureTable::from_vec(data, NODES, DIM, &Device::Cpu).unwrap();
        MeanAggregator::new(
            FeatureSource::Table(table),
            WeightedNeighborSampler::seeded(false, 0),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn batch_rows_sum_to_one(
            sets in prop::collection::vec(arb_neighbors(), 1..6),
        ) {
            let nodes: Vec<NodeId> = (0..sets.len() as NodeId).collect();
            let sampled: Vec<_> = sets.iter().map(to_set).collect();
            let batch = SampledBatch::build(&nodes, &sampled).unwrap();

            prop_assert_eq!(batch.rows(), nodes.len());
            for i in 0..batch.rows() {
                let sum: f32 = batch.row(i).iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-4, "row {} sums to {}", i, sum);
                prop_assert!(batch.row(i).iter().all(|&w| w >= 0.0));
            }
        }

        #[test]
        fn aggregate_is_weighted_mean(neighbors in arb_neighbors()) {
            let set = to_set(&neighbors);
            let out = aggregator()
                .aggregate(&[0], &[&set], None)
                .unwrap()
                .to_vec2::<f32>()
                .unwrap();

            let total: f32 = neighbors.values().sum();
            for d in 0..DIM {
                let expected: f32 = neighbors
                    .iter()
                    .map(|(&id, &w)| w * feature(id, d))
                    .sum::<f32>()
                    / total;
                prop_assert!(
                    (out[0][d] - expected).abs() < 1e-3,
                    "dim {}: got {}, expected {}", d, out[0][d], expected
                );
            }
        }

        #[test]
        fn aggregate_ignores_input_order(
            neighbors in arb_neighbors(),
            rotate in 0usize..20,
        ) {
            let mut pairs: Vec<(NodeId, f32)> = neighbors.iter().map(|(&id, &w)| (id, w)).collect();
            let forward = WeightedNeighborSet::from_pairs(pairs.clone());
            let len = pairs.len();
            pairs.rotate_left(rotate % len);
            pairs.reverse();
            let shuffled = WeightedNeighborSet::from_pairs(pairs);

            let agg = aggregator();
            let a = agg.aggregate(&[1], &[&forward], None).unwrap().to_vec2::<f32>().unwrap();
            let b = agg.aggregate(&[1], &[&shuffled], None).unwrap().to_vec2::<f32>().unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
