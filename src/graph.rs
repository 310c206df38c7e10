//! Weighted adjacency structure consumed by the encoders.
//!
//! The graph builder hands over one [`WeightedNeighborSet`] per node. Sets are
//! immutable values: sampling and self-loop injection build new sets instead
//! of editing the shared [`Adjacency`], so one batch can never leak into the
//! next.

use crate::error::{Error, Result};

/// Node identifier: row index into the feature table.
pub type NodeId = u32;

/// The weighted neighbors of a single node.
///
/// Entries are kept sorted by neighbor id with at most one entry per
/// neighbor, so two sets built from the same pairs in any order are equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedNeighborSet {
    entries: Vec<(NodeId, f32)>,
}

impl WeightedNeighborSet {
    /// Build a set from `(neighbor, weight)` pairs.
    ///
    /// If a neighbor appears more than once, the last weight wins.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NodeId, f32)>) -> Self {
        let mut entries: Vec<(NodeId, f32)> = Vec::new();
        for (neighbor, weight) in pairs {
            match entries.binary_search_by_key(&neighbor, |&(id, _)| id) {
                Ok(pos) => entries[pos].1 = weight,
                Err(pos) => entries.insert(pos, (neighbor, weight)),
            }
        }
        Self { entries }
    }

    /// A set holding only the self-loop `(node, 1.0)`.
    pub fn self_loop(node: NodeId) -> Self {
        Self {
            entries: vec![(node, 1.0)],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(neighbor, weight)` pairs in ascending neighbor order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        self.entries.iter().copied()
    }

    /// Neighbor ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|&(id, _)| id)
    }

    pub fn as_slice(&self) -> &[(NodeId, f32)] {
        &self.entries
    }

    pub fn contains(&self, neighbor: NodeId) -> bool {
        self.weight(neighbor).is_some()
    }

    pub fn weight(&self, neighbor: NodeId) -> Option<f32> {
        self.entries
            .binary_search_by_key(&neighbor, |&(id, _)| id)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Sum of weights, accumulated in `f64` so large finite weights do not
    /// overflow.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|&(_, w)| f64::from(w)).sum()
    }

    /// Return a new set with `(node, 1.0)` added.
    ///
    /// An existing entry for `node` is replaced, so the result always holds
    /// exactly `(node, 1.0)`.
    #[must_use]
    pub fn with_self_loop(&self, node: NodeId) -> Self {
        let mut entries = self.entries.clone();
        match entries.binary_search_by_key(&node, |&(id, _)| id) {
            Ok(pos) => entries[pos].1 = 1.0,
            Err(pos) => entries.insert(pos, (node, 1.0)),
        }
        Self { entries }
    }

    /// True if every entry of `self` is also an entry of `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.iter().all(|(id, w)| other.weight(id) == Some(w))
    }

    /// Check weights are finite and non-negative.
    pub fn validate(&self, node: NodeId) -> Result<()> {
        for &(neighbor, weight) in &self.entries {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidWeight {
                    node,
                    neighbor,
                    weight,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(NodeId, f32)> for WeightedNeighborSet {
    fn from_iter<I: IntoIterator<Item = (NodeId, f32)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Degree summary over an adjacency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub min_degree: usize,
    pub max_degree: usize,
    pub avg_degree: f64,
    /// Nodes whose only neighbor is themselves.
    pub self_loop_only: usize,
}

/// Read-only adjacency: one [`WeightedNeighborSet`] per node in
/// `[0, node_count)`.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    sets: Vec<WeightedNeighborSet>,
}

impl Adjacency {
    /// Wrap prebuilt sets; `sets[i]` holds the neighbors of node `i`.
    ///
    /// Every referenced neighbor must be a valid node and every weight must
    /// be finite and non-negative.
    pub fn from_sets(sets: Vec<WeightedNeighborSet>) -> Result<Self> {
        let node_count = sets.len();
        for (node, set) in sets.iter().enumerate() {
            let node = node as NodeId;
            set.validate(node)?;
            if let Some(bad) = set.ids().find(|&id| id as usize >= node_count) {
                return Err(Error::NodeNotFound {
                    node: bad,
                    node_count,
                });
            }
        }
        Ok(Self { sets })
    }

    /// Build from `(node, neighbor, weight)` edges, meaning `neighbor`
    /// contributes to `node` with `weight`.
    ///
    /// Nodes with no incoming edge get a self-loop-only set so every node has
    /// a non-empty neighborhood.
    pub fn from_edges(
        node_count: usize,
        edges: impl IntoIterator<Item = (NodeId, NodeId, f32)>,
    ) -> Result<Self> {
        let mut pairs: Vec<Vec<(NodeId, f32)>> = vec![Vec::new(); node_count];
        for (node, neighbor, weight) in edges {
            for id in [node, neighbor] {
                if id as usize >= node_count {
                    return Err(Error::NodeNotFound {
                        node: id,
                        node_count,
                    });
                }
            }
            pairs[node as usize].push((neighbor, weight));
        }

        let sets = pairs
            .into_iter()
            .enumerate()
            .map(|(node, p)| {
                if p.is_empty() {
                    WeightedNeighborSet::self_loop(node as NodeId)
                } else {
                    WeightedNeighborSet::from_pairs(p)
                }
            })
            .collect();

        Self::from_sets(sets)
    }

    pub fn node_count(&self) -> usize {
        self.sets.len()
    }

    /// Neighbor set of `node`.
    pub fn neighbors(&self, node: NodeId) -> Result<&WeightedNeighborSet> {
        self.sets.get(node as usize).ok_or(Error::NodeNotFound {
            node,
            node_count: self.sets.len(),
        })
    }

    pub fn degree_stats(&self) -> DegreeStats {
        let degrees: Vec<usize> = self.sets.iter().map(WeightedNeighborSet::len).collect();
        let edge_count: usize = degrees.iter().sum();
        let self_loop_only = self
            .sets
            .iter()
            .enumerate()
            .filter(|(node, set)| set.len() == 1 && set.contains(*node as NodeId))
            .count();

        DegreeStats {
            node_count: self.sets.len(),
            edge_count,
            min_degree: degrees.iter().copied().min().unwrap_or(0),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
            avg_degree: if degrees.is_empty() {
                0.0
            } else {
                edge_count as f64 / degrees.len() as f64
            },
            self_loop_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_order_independent() {
        let a = WeightedNeighborSet::from_pairs([(3, 1.0), (1, 2.0), (2, 0.5)]);
        let b = WeightedNeighborSet::from_pairs([(2, 0.5), (3, 1.0), (1, 2.0)]);
        assert_eq!(a, b);
        assert_eq!(a.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_neighbor_last_wins() {
        let set = WeightedNeighborSet::from_pairs([(1, 2.0), (1, 3.0)]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.weight(1), Some(3.0));
    }

    #[test]
    fn test_self_loop_replaces_existing_weight() {
        let set = WeightedNeighborSet::from_pairs([(4, 0.25), (7, 2.0)]);
        let looped = set.with_self_loop(4);
        assert_eq!(looped.len(), 2);
        assert_eq!(looped.weight(4), Some(1.0));
        // original untouched
        assert_eq!(set.weight(4), Some(0.25));
    }

    #[test]
    fn test_from_edges_fills_isolated_nodes() {
        let adj = Adjacency::from_edges(3, [(0, 1, 1.0), (1, 0, 1.0)]).unwrap();
        let isolated = adj.neighbors(2).unwrap();
        assert_eq!(isolated, &WeightedNeighborSet::self_loop(2));

        let stats = adj.degree_stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.self_loop_only, 1);
    }

    #[test]
    fn test_from_edges_rejects_out_of_range() {
        let err = Adjacency::from_edges(2, [(0, 5, 1.0)]).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound { node: 5, .. }));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = Adjacency::from_edges(2, [(0, 1, -1.0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidWeight { node: 0, neighbor: 1, .. }));
    }

    #[test]
    fn test_missing_node_lookup() {
        let adj = Adjacency::from_edges(2, [(0, 1, 1.0)]).unwrap();
        assert!(matches!(
            adj.neighbors(9),
            Err(Error::NodeNotFound { node: 9, node_count: 2 })
        ));
    }
}
