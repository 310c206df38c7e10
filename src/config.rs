//! Experiment configuration.
//!
//! One [`ExperimentConfig`] value describes a whole run: model shape,
//! optimization schedule, device and seed. It is passed explicitly to the
//! model and trainer and saved next to every checkpoint.

use std::path::Path;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampling::SampleCap;

/// Encoder stack shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Input feature dimension (default: 512).
    pub feat_dim: usize,
    /// Output dimension of each encoder, bottom first (default: [512, 512]).
    pub embed_dims: Vec<usize>,
    /// Neighbors sampled per node; `None` uses the full neighborhood
    /// (default: 10).
    pub num_sample: SampleCap,
    /// GCN-style self-loops (default: true).
    pub gcn: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            feat_dim: 512,
            embed_dims: vec![512, 512],
            num_sample: Some(10),
            gcn: true,
        }
    }
}

impl ModelConfig {
    /// Deepest supported encoder stack.
    pub const MAX_DEPTH: usize = 2;

    pub fn with_feat_dim(mut self, dim: usize) -> Self {
        self.feat_dim = dim;
        self
    }

    pub fn with_embed_dims(mut self, dims: Vec<usize>) -> Self {
        self.embed_dims = dims;
        self
    }

    pub fn with_num_sample(mut self, num_sample: SampleCap) -> Self {
        self.num_sample = num_sample;
        self
    }

    pub fn with_gcn(mut self, gcn: bool) -> Self {
        self.gcn = gcn;
        self
    }

    /// Embedding dimension of the top encoder.
    pub fn embed_dim(&self) -> usize {
        self.embed_dims.last().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feat_dim == 0 {
            return Err(Error::InvalidConfig("feat_dim must be positive".into()));
        }
        if self.embed_dims.is_empty() || self.embed_dims.len() > Self::MAX_DEPTH {
            return Err(Error::InvalidConfig(format!(
                "embed_dims must list 1 to {} encoder dimensions, got {}",
                Self::MAX_DEPTH,
                self.embed_dims.len()
            )));
        }
        if self.embed_dims.contains(&0) {
            return Err(Error::InvalidConfig("embed_dims must be positive".into()));
        }
        if self.num_sample == Some(0) {
            return Err(Error::InvalidConfig(
                "num_sample must be positive (use null for no cap)".into(),
            ));
        }
        Ok(())
    }
}

/// Optimizer choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    /// AdamW with zero weight decay.
    Adam,
}

/// Optimization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Training nodes; the remaining nodes are held out for validation
    /// (default: 25000).
    pub train_num: usize,
    /// Number of epochs (default: 20).
    pub epochs: usize,
    /// Batch size (default: 128).
    pub batch_size: usize,
    /// Iterations between averaged loss reports (default: 50).
    pub check_step: usize,
    /// Initial learning rate (default: 0.5).
    pub learning_rate: f64,
    /// Epochs between learning-rate decays (default: 20).
    pub step_size: usize,
    /// Learning-rate decay factor (default: 0.1).
    pub gamma: f64,
    /// Optimizer (default: SGD).
    pub optimizer: OptimizerKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_num: 25_000,
            epochs: 20,
            batch_size: 128,
            check_step: 50,
            learning_rate: 0.5,
            step_size: 20,
            gamma: 0.1,
            optimizer: OptimizerKind::Sgd,
        }
    }
}

impl TrainingConfig {
    pub fn with_train_num(mut self, n: usize) -> Self {
        self.train_num = n;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_check_step(mut self, check_step: usize) -> Self {
        self.check_step = check_step;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_schedule(mut self, step_size: usize, gamma: f64) -> Self {
        self.step_size = step_size;
        self.gamma = gamma;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// StepLR: `lr * gamma^(epoch / step_size)`.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        let decays = (epoch / self.step_size.max(1)) as i32;
        self.learning_rate * self.gamma.powi(decays)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.check_step == 0 {
            return Err(Error::InvalidConfig("check_step must be positive".into()));
        }
        if self.step_size == 0 {
            return Err(Error::InvalidConfig("step_size must be positive".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig("learning_rate must be positive".into()));
        }
        Ok(())
    }
}

/// Everything one training run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    #[serde(flatten)]
    pub model: ModelConfig,
    #[serde(flatten)]
    pub training: TrainingConfig,
    /// Use CUDA device 0 when available (default: false).
    pub use_accelerator: bool,
    /// Seed for the split, shuffling, sampling and initialization
    /// (default: 2).
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            use_accelerator: false,
            seed: 2,
        }
    }
}

impl ExperimentConfig {
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_accelerator(mut self, use_accelerator: bool) -> Self {
        self.use_accelerator = use_accelerator;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()
    }

    /// Device selected by `use_accelerator`; falls back to CPU when no
    /// CUDA device is present.
    pub fn device(&self) -> Result<Device> {
        if self.use_accelerator {
            Ok(Device::cuda_if_available(0)?)
        } else {
            Ok(Device::Cpu)
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
