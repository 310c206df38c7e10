//! Checkpoint files.
//!
//! A checkpoint is a safetensors file of named parameters plus a JSON sidecar
//! (same stem, `.json` extension) recording the run configuration, so an
//! inference graph can rebuild a compatible model before loading weights.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::params::ParameterStore;

/// Run metadata stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub config: ExperimentConfig,
    pub class_count: usize,
    /// Node count of the training graph.
    pub node_count: usize,
    /// Parameter keys present in the weights file.
    pub parameter_keys: Vec<String>,
}

/// Sidecar path for the weights at `path`.
pub fn meta_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("json")
}

/// Write weights and metadata.
pub fn save_checkpoint(
    store: &ParameterStore,
    meta: &CheckpointMeta,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    store.save(path)?;
    fs::write(meta_path(path), serde_json::to_string_pretty(meta)?)?;
    tracing::info!(
        path = %path.display(),
        parameters = meta.parameter_keys.len(),
        "checkpoint saved"
    );
    Ok(())
}

/// Read the metadata of the checkpoint at `path`.
pub fn read_meta(path: impl AsRef<Path>) -> Result<CheckpointMeta> {
    let raw = fs::read_to_string(meta_path(path))?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_path() {
        assert_eq!(
            meta_path("runs/checkpoint.safetensors"),
            PathBuf::from("runs/checkpoint.json")
        );
    }

    #[test]
    fn test_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.safetensors");
        let store = ParameterStore::new(&candle_core::Device::Cpu);
        store
            .var_builder()
            .get_with_hints(2, "bias", candle_nn::Init::Const(0.0))
            .unwrap();
        let meta = CheckpointMeta {
            config: ExperimentConfig::default(),
            class_count: 4,
            node_count: 10,
            parameter_keys: vec!["bias".into()],
        };
        save_checkpoint(&store, &meta, &path).unwrap();
        assert_eq!(read_meta(&path).unwrap(), meta);
    }
}
