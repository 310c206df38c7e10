//! Weighted neighbor sampling for GraphSAGE-style aggregation.
//!
//! # Key Types
//!
//! - [`WeightedNeighborSampler`] - caps each node's neighborhood at `k`
//!   entries, optionally adding a GCN self-loop afterwards
//! - [`SharedRng`] - seedable random source shared by every layer of a model
//!
//! Sampling is uniform without replacement. A neighborhood that already fits
//! under the cap is returned unchanged, and with no cap the full set is used.

use crate::graph::{NodeId, WeightedNeighborSet};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maximum neighbors kept per node; `None` disables sampling.
pub type SampleCap = Option<usize>;

/// Seedable random source, cheap to clone and shared between layers.
///
/// Cloning shares the underlying generator, so reseeding one handle reseeds
/// every layer that draws from it.
#[derive(Debug, Clone)]
pub struct SharedRng(Arc<Mutex<XorShiftRng>>);

impl SharedRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(XorShiftRng::seed_from_u64(seed))))
    }

    /// Reset the generator to the state given by `seed`.
    pub fn reseed(&self, seed: u64) {
        *self.lock() = XorShiftRng::seed_from_u64(seed);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, XorShiftRng> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Samples a bounded subset of a node's weighted neighborhood.
#[derive(Debug, Clone)]
pub struct WeightedNeighborSampler {
    self_loop: bool,
    rng: SharedRng,
}

impl WeightedNeighborSampler {
    /// Create a sampler drawing from `rng`.
    ///
    /// With `self_loop` set, `(node, 1.0)` is added after sampling, so it
    /// never counts against the cap and is never dropped.
    pub fn new(self_loop: bool, rng: SharedRng) -> Self {
        Self { self_loop, rng }
    }

    /// Create a sampler with its own generator seeded from `seed`.
    pub fn seeded(self_loop: bool, seed: u64) -> Self {
        Self::new(self_loop, SharedRng::seed_from_u64(seed))
    }

    pub fn self_loop(&self) -> bool {
        self.self_loop
    }

    pub fn rng(&self) -> &SharedRng {
        &self.rng
    }

    pub fn reseed(&self, seed: u64) {
        self.rng.reseed(seed);
    }

    /// Sample the neighborhood of `node`.
    ///
    /// # Complexity
    /// O(min(k, degree)) draws plus O(degree) to rebuild the set.
    pub fn sample(
        &self,
        node: NodeId,
        neighbors: &WeightedNeighborSet,
        cap: SampleCap,
    ) -> WeightedNeighborSet {
        let sampled = match cap {
            Some(k) if neighbors.len() > k => {
                let mut rng = self.rng.lock();
                neighbors
                    .as_slice()
                    .choose_multiple(&mut *rng, k)
                    .copied()
                    .collect()
            }
            _ => neighbors.clone(),
        };

        if self.self_loop {
            sampled.with_self_loop(node)
        } else {
            sampled
        }
    }

    /// Sample every node of a batch, in batch order.
    pub fn sample_batch(
        &self,
        nodes: &[NodeId],
        neighbor_sets: &[&WeightedNeighborSet],
        cap: SampleCap,
    ) -> Vec<WeightedNeighborSet> {
        nodes
            .iter()
            .zip(neighbor_sets)
            .map(|(&node, set)| self.sample(node, set, cap))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five() -> WeightedNeighborSet {
        WeightedNeighborSet::from_pairs((10..15).map(|id| (id, id as f32)))
    }

    #[test]
    fn test_under_cap_returns_full_set() {
        let sampler = WeightedNeighborSampler::seeded(false, 7);
        let set = five();
        assert_eq!(sampler.sample(0, &set, Some(5)), set);
        assert_eq!(sampler.sample(0, &set, Some(50)), set);
        assert_eq!(sampler.sample(0, &set, None), set);
    }

    #[test]
    fn test_over_cap_is_subset() {
        let sampler = WeightedNeighborSampler::seeded(false, 7);
        let set = five();
        for _ in 0..50 {
            let sampled = sampler.sample(0, &set, Some(3));
            assert_eq!(sampled.len(), 3);
            assert!(sampled.is_subset_of(&set));
        }
    }

    #[test]
    fn test_self_loop_outside_budget() {
        let sampler = WeightedNeighborSampler::seeded(true, 7);
        let sampled = sampler.sample(99, &five(), Some(2));
        assert_eq!(sampled.len(), 3);
        assert_eq!(sampled.weight(99), Some(1.0));
    }

    #[test]
    fn test_shared_rng_reseed_replays() {
        let rng = SharedRng::seed_from_u64(1);
        let a = WeightedNeighborSampler::new(false, rng.clone());
        let set = five();

        let first: Vec<_> = (0..20).map(|_| a.sample(0, &set, Some(1))).collect();
        rng.reseed(1);
        let second: Vec<_> = (0..20).map(|_| a.sample(0, &set, Some(1))).collect();
        assert_eq!(first, second);
    }
}
