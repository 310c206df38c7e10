//! Supervised training loop.
//!
//! The loop:
//! 1. Split nodes into train/validation with a seeded permutation
//! 2. Each epoch: apply the StepLR rate, shuffle the training nodes
//! 3.   For each mini-batch: cross-entropy loss, backward, optimizer step
//! 4.   Every `check_step` iterations: report the averaged loss
//! 5. End of epoch: validation accuracy (argmax of logits)
//!
//! # Example
//!
//! ```rust,ignore
//! use landsage::train::Trainer;
//!
//! let trainer = Trainer::new(&model, &store, &config.training, config.seed);
//! let report = trainer.train(labels)?;
//! println!("final accuracy: {:?}", report.final_accuracy());
//! ```

use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::config::{OptimizerKind, TrainingConfig};
use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::model::SupervisedGraphSage;
use crate::params::ParameterStore;

/// Averaged training loss at one check step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossPoint {
    pub epoch: usize,
    pub iteration: usize,
    pub loss: f64,
}

/// Per-epoch summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub learning_rate: f64,
    /// Mean loss over the epoch's batches.
    pub loss: f64,
    /// Accuracy on held-out nodes (None if there are none).
    pub validation_accuracy: Option<f64>,
}

/// Callback for training progress.
pub type ProgressCallback<'a> = Box<dyn FnMut(&EpochMetrics) + 'a>;

/// Loss curve and validation history of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_nodes: usize,
    pub validation_nodes: usize,
    pub iterations: usize,
    pub loss_curve: Vec<LossPoint>,
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingReport {
    pub fn final_accuracy(&self) -> Option<f64> {
        self.epochs.last().and_then(|e| e.validation_accuracy)
    }
}

/// Either optimizer behind one interface.
enum OptimizerWrapper {
    Sgd(SGD),
    Adam(AdamW),
}

impl OptimizerWrapper {
    fn new(kind: OptimizerKind, store: &ParameterStore, lr: f64) -> Result<Self> {
        Ok(match kind {
            OptimizerKind::Sgd => OptimizerWrapper::Sgd(SGD::new(store.vars(), lr)?),
            OptimizerKind::Adam => OptimizerWrapper::Adam(AdamW::new(
                store.vars(),
                ParamsAdamW {
                    lr,
                    weight_decay: 0.0,
                    ..Default::default()
                },
            )?),
        })
    }

    fn backward_step(&mut self, loss: &candle_core::Tensor) -> Result<()> {
        match self {
            OptimizerWrapper::Sgd(opt) => opt.backward_step(loss)?,
            OptimizerWrapper::Adam(opt) => opt.backward_step(loss)?,
        }
        Ok(())
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            OptimizerWrapper::Sgd(opt) => opt.set_learning_rate(lr),
            OptimizerWrapper::Adam(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Split `0..node_count` into `train_num` training nodes and the rest for
/// validation, using a permutation seeded by `seed`.
pub fn split_nodes(node_count: usize, train_num: usize, seed: u64) -> Result<(Vec<NodeId>, Vec<NodeId>)> {
    if train_num == 0 || train_num > node_count {
        return Err(Error::InvalidConfig(format!(
            "train_num must be in 1..={node_count}, got {train_num}"
        )));
    }
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut nodes: Vec<NodeId> = (0..node_count as NodeId).collect();
    nodes.shuffle(&mut rng);
    let validation = nodes.split_off(train_num);
    Ok((nodes, validation))
}

/// Fraction of `nodes` whose predicted class equals its label.
///
/// `labels` holds one label per node of the model's graph. Returns `None`
/// for an empty node list.
pub fn accuracy(
    model: &SupervisedGraphSage,
    nodes: &[NodeId],
    labels: &[u32],
    batch_size: usize,
) -> Result<Option<f64>> {
    let node_count = model.node_count();
    if labels.len() != node_count {
        return Err(Error::shape("label count", node_count, labels.len()));
    }
    if nodes.is_empty() {
        return Ok(None);
    }
    let mut correct = 0usize;
    for batch in nodes.chunks(batch_size.max(1)) {
        let predicted = model.predict(batch)?;
        correct += batch
            .iter()
            .zip(&predicted)
            .filter(|&(&node, &p)| labels[node as usize] == p)
            .count();
    }
    Ok(Some(correct as f64 / nodes.len() as f64))
}

/// Mini-batch trainer for a [`SupervisedGraphSage`] whose parameters live in
/// `store`.
pub struct Trainer<'a> {
    model: &'a SupervisedGraphSage,
    store: &'a ParameterStore,
    config: &'a TrainingConfig,
    seed: u64,
}

impl<'a> Trainer<'a> {
    pub fn new(
        model: &'a SupervisedGraphSage,
        store: &'a ParameterStore,
        config: &'a TrainingConfig,
        seed: u64,
    ) -> Self {
        Self {
            model,
            store,
            config,
            seed,
        }
    }

    /// Train on `labels` (one per node).
    pub fn train(&self, labels: &[u32]) -> Result<TrainingReport> {
        self.train_with_callback(labels, Box::new(|_| {}))
    }

    /// Train, calling `callback` after every epoch.
    pub fn train_with_callback(
        &self,
        labels: &[u32],
        mut callback: ProgressCallback<'_>,
    ) -> Result<TrainingReport> {
        self.config.validate()?;
        let node_count = self.model.node_count();
        if labels.len() != node_count {
            return Err(Error::shape("label count", node_count, labels.len()));
        }

        let (mut train_nodes, val_nodes) =
            split_nodes(node_count, self.config.train_num, self.seed)?;
        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let mut optimizer =
            OptimizerWrapper::new(self.config.optimizer, self.store, self.config.learning_rate)?;

        let mut report = TrainingReport {
            train_nodes: train_nodes.len(),
            validation_nodes: val_nodes.len(),
            ..Default::default()
        };
        tracing::info!(
            train = report.train_nodes,
            validation = report.validation_nodes,
            epochs = self.config.epochs,
            optimizer = ?self.config.optimizer,
            "starting training"
        );

        let check_step = self.config.check_step;
        let mut running = 0.0f64;
        for epoch in 0..self.config.epochs {
            let lr = self.config.learning_rate_at(epoch);
            optimizer.set_learning_rate(lr);
            train_nodes.shuffle(&mut rng);

            let mut epoch_loss = 0.0f64;
            let mut epoch_batches = 0usize;
            for batch in train_nodes.chunks(self.config.batch_size) {
                let batch_labels: Vec<u32> = batch.iter().map(|&n| labels[n as usize]).collect();
                let loss = self.model.loss(batch, &batch_labels)?;
                optimizer.backward_step(&loss)?;

                let value = f64::from(loss.to_scalar::<f32>()?);
                running += value;
                epoch_loss += value;
                epoch_batches += 1;
                report.iterations += 1;

                if report.iterations % check_step == 0 {
                    let avg = running / check_step as f64;
                    tracing::info!(
                        epoch,
                        iteration = report.iterations,
                        loss = format!("{avg:.4}"),
                        "training loss"
                    );
                    report.loss_curve.push(LossPoint {
                        epoch,
                        iteration: report.iterations,
                        loss: avg,
                    });
                    running = 0.0;
                }
            }

            let validation_accuracy =
                accuracy(self.model, &val_nodes, labels, self.config.batch_size)?;
            let metrics = EpochMetrics {
                epoch,
                learning_rate: lr,
                loss: if epoch_batches == 0 {
                    0.0
                } else {
                    epoch_loss / epoch_batches as f64
                },
                validation_accuracy,
            };
            tracing::info!(
                epoch,
                lr,
                loss = format!("{:.4}", metrics.loss),
                accuracy = ?validation_accuracy.map(|a| format!("{a:.4}")),
                "epoch finished"
            );
            callback(&metrics);
            report.epochs.push(metrics);
        }

        Ok(report)
    }
}
