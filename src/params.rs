//! Named parameter storage.
//!
//! [`ParameterStore`] owns the candle [`VarMap`] that every layer registers
//! its weights in. Keys follow the layer prefixes used by the model
//! (`encoder_1.weight`, `encoder_2.weight`, `classifier.weight`,
//! `classifier.bias`), which are also the keys written to checkpoints.

use std::collections::HashMap;
use std::path::Path;
use std::sync::PoisonError;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::error::{Error, Result};

/// Trainable parameters of one model, keyed by name.
pub struct ParameterStore {
    varmap: VarMap,
    device: Device,
}

impl ParameterStore {
    pub fn new(device: &Device) -> Self {
        Self {
            varmap: VarMap::new(),
            device: device.clone(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Builder that registers new variables in this store.
    pub fn var_builder(&self) -> VarBuilder<'static> {
        VarBuilder::from_varmap(&self.varmap, DType::F32, &self.device)
    }

    /// All trainable variables, for the optimizer.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Registered parameter names, sorted.
    pub fn names(&self) -> Vec<String> {
        let data = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Tensor> {
        let data = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        data.get(name).map(|var| var.as_tensor().clone())
    }

    /// Re-initialize every parameter from `seed`.
    ///
    /// Names ending in `bias` are zeroed; everything else gets Xavier-uniform
    /// values over its `(fan_out, fan_in)` shape. Parameters are visited in
    /// name order so the result only depends on `seed`.
    pub fn initialize(&self, seed: u64) -> Result<()> {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let data = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();

        for name in names {
            let var = &data[name];
            let shape = var.shape().clone();
            let count = shape.elem_count();
            let values: Vec<f32> = if name.ends_with("bias") {
                vec![0.0; count]
            } else {
                let dims = shape.dims();
                let fan_out = dims.first().copied().unwrap_or(1);
                let fan_in = dims.get(1).copied().unwrap_or(1);
                let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
                (0..count).map(|_| rng.random_range(-bound..bound)).collect()
            };
            var.set(&Tensor::from_vec(values, shape, &self.device)?)?;
        }
        Ok(())
    }

    /// Snapshot of every parameter.
    pub fn export(&self) -> HashMap<String, Tensor> {
        let data = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        data.iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect()
    }

    /// Overwrite the parameters named in `keys` from `tensors`.
    ///
    /// Parameters not listed keep their current values. Each listed key must
    /// exist both in the store and in `tensors`, with identical shapes.
    pub fn import<S: AsRef<str>>(&self, tensors: &HashMap<String, Tensor>, keys: &[S]) -> Result<()> {
        let data = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            let key = key.as_ref();
            let var = data
                .get(key)
                .ok_or_else(|| Error::MissingParameter(format!("{key} (not a model parameter)")))?;
            let tensor = tensors
                .get(key)
                .ok_or_else(|| Error::MissingParameter(key.to_string()))?;

            let expected = var.dims();
            let got = tensor.dims();
            if expected.len() != got.len() {
                return Err(Error::shape(format!("{key} rank"), expected.len(), got.len()));
            }
            if let Some(axis) = (0..expected.len()).find(|&i| expected[i] != got[i]) {
                return Err(Error::shape(
                    format!("{key} dim {axis}"),
                    expected[axis],
                    got[axis],
                ));
            }

            let tensor = tensor.to_dtype(DType::F32)?.to_device(&self.device)?;
            var.set(&tensor)?;
        }
        Ok(())
    }

    /// Write every parameter to a safetensors file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Load every parameter from a safetensors file.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let names = self.names();
        self.load_partial(path, &names)
    }

    /// Load only `keys` from a safetensors file, leaving the rest as they are.
    pub fn load_partial<S: AsRef<str>>(&self, path: impl AsRef<Path>, keys: &[S]) -> Result<()> {
        let tensors = candle_core::safetensors::load(path, &self.device)?;
        let untouched = self.names().len().saturating_sub(keys.len());
        if untouched > 0 {
            tracing::warn!(
                loaded = keys.len(),
                untouched,
                "partial parameter load, remaining parameters keep their values"
            );
        }
        self.import(&tensors, keys)
    }
}
