//! Error types for landsage.

use thiserror::Error;

use crate::graph::NodeId;

/// Landsage error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV error while reading graph files.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Node id has no feature row or adjacency entry.
    #[error("node {node} not found (node count {node_count})")]
    NodeNotFound { node: NodeId, node_count: usize },

    /// Dimension mismatch between two things that must agree.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    /// A node's sampled neighborhood is empty or carries zero total weight.
    #[error("node {node} has an empty sampled neighborhood")]
    EmptyNeighborhood { node: NodeId },

    /// Class label outside `[0, class_count)`.
    #[error("label {label} out of range for {class_count} classes")]
    InvalidLabel { label: u32, class_count: usize },

    /// Negative or non-finite edge weight.
    #[error("invalid weight {weight} on edge {neighbor} -> {node}")]
    InvalidWeight {
        node: NodeId,
        neighbor: NodeId,
        weight: f32,
    },

    /// Checkpoint lacks a requested parameter.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Malformed graph input file.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl Error {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            got,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
