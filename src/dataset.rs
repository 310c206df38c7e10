//! Loading graph-builder output from disk.
//!
//! A dataset directory holds:
//!
//! - `features.npy`: `node_count x feat_dim` float matrix
//! - `adjacency.csv`: headerless `node,neighbor,weight` rows
//! - `labels.csv` (optional): one class label per line, in node order
//!
//! Nodes without any adjacency row get a self-loop-only neighborhood.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};

use crate::error::{Error, Result};
use crate::feature::FeatureTable;
use crate::graph::{Adjacency, NodeId};

pub const FEATURES_FILE: &str = "features.npy";
pub const ADJACENCY_FILE: &str = "adjacency.csv";
pub const LABELS_FILE: &str = "labels.csv";

/// Feature table, adjacency and optional labels of one graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphData {
    features: FeatureTable,
    adjacency: Arc<Adjacency>,
    labels: Option<Vec<u32>>,
}

impl GraphData {
    /// Assemble a snapshot, checking that all parts agree on node count.
    pub fn new(
        features: FeatureTable,
        adjacency: Adjacency,
        labels: Option<Vec<u32>>,
    ) -> Result<Self> {
        let node_count = features.node_count();
        if adjacency.node_count() != node_count {
            return Err(Error::shape("adjacency node count", node_count, adjacency.node_count()));
        }
        if let Some(labels) = &labels {
            if labels.len() != node_count {
                return Err(Error::shape("label count", node_count, labels.len()));
            }
        }
        Ok(Self {
            features,
            adjacency: Arc::new(adjacency),
            labels,
        })
    }

    /// Load a dataset directory.
    pub fn load(dir: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        let features = read_features(dir.join(FEATURES_FILE), device)?;
        let node_count = features.node_count();
        let adjacency = read_adjacency(dir.join(ADJACENCY_FILE), node_count)?;

        let labels_path = dir.join(LABELS_FILE);
        let labels = if labels_path.exists() {
            Some(read_labels(labels_path)?)
        } else {
            None
        };

        let data = Self::new(features, adjacency, labels)?;
        tracing::info!(
            dir = %dir.display(),
            nodes = data.node_count(),
            feat_dim = data.feat_dim(),
            classes = ?data.class_count(),
            "loaded graph"
        );
        Ok(data)
    }

    pub fn node_count(&self) -> usize {
        self.features.node_count()
    }

    pub fn feat_dim(&self) -> usize {
        self.features.dim()
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn adjacency(&self) -> &Arc<Adjacency> {
        &self.adjacency
    }

    pub fn labels(&self) -> Option<&[u32]> {
        self.labels.as_deref()
    }

    /// `max label + 1`, or `None` for unlabeled graphs.
    pub fn class_count(&self) -> Option<usize> {
        self.labels
            .as_ref()
            .and_then(|l| l.iter().max())
            .map(|&max| max as usize + 1)
    }
}

/// Read a rank-2 `.npy` feature matrix as `f32`.
pub fn read_features(path: impl AsRef<Path>, device: &Device) -> Result<FeatureTable> {
    let table = Tensor::read_npy(path)?
        .to_dtype(DType::F32)?
        .to_device(device)?;
    FeatureTable::new(table)
}

/// Read `node,neighbor,weight` rows.
pub fn read_adjacency(path: impl AsRef<Path>, node_count: usize) -> Result<Adjacency> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut edges = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        if record.len() != 3 {
            return Err(Error::Parse {
                line,
                message: format!("expected node,neighbor,weight, got {} fields", record.len()),
            });
        }
        let node: NodeId = parse_field(&record[0], line)?;
        let neighbor: NodeId = parse_field(&record[1], line)?;
        let weight: f32 = parse_field(&record[2], line)?;
        edges.push((node, neighbor, weight));
    }

    Adjacency::from_edges(node_count, edges)
}

/// Read one label per non-empty line.
pub fn read_labels(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let reader = BufReader::new(File::open(path)?);
    let mut labels = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        labels.push(parse_field(trimmed, i + 1)?);
    }
    Ok(labels)
}

fn parse_field<T>(field: &str, line: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field.parse().map_err(|e: T::Err| Error::Parse {
        line,
        message: format!("{field:?}: {e}"),
    })
}
