//! Optimizers.
//!
//! The optimizer is a pure transform: [`Adam::update`] takes gradients and an
//! [`AdamState`] and returns updates together with the next state. Nothing is
//! held inside the optimizer apart from its configuration.
use crate::util::NamedTensors;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Learning rate schedule.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum LrSchedule {
    /// Fixed learning rate.
    Constant,

    /// Decays linearly to zero over the training run, constant within an update step.
    ///
    /// `lr(count) = lr * (1 - floor(count / opt_steps_per_update) / num_updates)`.
    LinearDecay {
        /// Optimizer steps of this parameter group in one update step.
        opt_steps_per_update: usize,

        /// Number of update steps of the training run.
        num_updates: usize,
    },
}

/// Configuration of [`Adam`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OptimizerConfig {
    /// Initial learning rate.
    pub lr: f64,

    #[serde(default = "default_beta1")]
    pub beta1: f64,

    #[serde(default = "default_beta2")]
    pub beta2: f64,

    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Gradients are rescaled so that their global norm does not exceed this value.
    pub max_grad_norm: f64,

    #[serde(default = "default_lr_schedule")]
    pub lr_schedule: LrSchedule,
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-5
}

fn default_lr_schedule() -> LrSchedule {
    LrSchedule::Constant
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            max_grad_norm: 0.5,
            lr_schedule: default_lr_schedule(),
        }
    }
}

impl OptimizerConfig {
    /// Override learning rate.
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Sets epsilon.
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Sets the maximum global norm of gradients.
    pub fn max_grad_norm(mut self, v: f64) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Sets the learning rate schedule.
    pub fn lr_schedule(mut self, v: LrSchedule) -> Self {
        self.lr_schedule = v;
        self
    }
}

/// Moment estimates and step counter of one parameter group.
#[derive(Clone, Debug)]
pub struct AdamState {
    /// Number of completed steps.
    pub count: usize,

    /// First moment.
    pub mu: NamedTensors,

    /// Second moment.
    pub nu: NamedTensors,
}

/// Adam with global-norm gradient clipping.
#[derive(Clone, Debug)]
pub struct Adam {
    config: OptimizerConfig,
}

impl Adam {
    /// Creates the optimizer.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Zero moments for the given parameters.
    pub fn init(&self, params: &NamedTensors) -> Result<AdamState> {
        Ok(AdamState {
            count: 0,
            mu: params.zeros_like()?,
            nu: params.zeros_like()?,
        })
    }

    /// Learning rate used for the step following `count` completed steps.
    pub fn learning_rate(&self, count: usize) -> f64 {
        match self.config.lr_schedule {
            LrSchedule::Constant => self.config.lr,
            LrSchedule::LinearDecay {
                opt_steps_per_update,
                num_updates,
            } => {
                let completed_updates = (count / opt_steps_per_update.max(1)) as f64;
                self.config.lr * (1.0 - completed_updates / num_updates.max(1) as f64)
            }
        }
    }

    /// Computes updates to be added to the parameters, and the next state.
    pub fn update(&self, grads: &NamedTensors, state: AdamState) -> Result<(NamedTensors, AdamState)> {
        let c = &self.config;
        let grads = clip_by_global_norm(grads, c.max_grad_norm)?;
        let (b1, b2) = (c.beta1, c.beta2);

        let mu = state
            .mu
            .zip_map(&grads, |m, g| m.affine(b1, 0.0)? + g.affine(1.0 - b1, 0.0)?)?;
        let nu = state
            .nu
            .zip_map(&grads, |v, g| v.affine(b2, 0.0)? + g.sqr()?.affine(1.0 - b2, 0.0)?)?;

        let t = (state.count + 1) as i32;
        let bc1 = 1.0 - b1.powi(t);
        let bc2 = 1.0 - b2.powi(t);
        let lr = self.learning_rate(state.count);
        let eps = c.eps;

        let updates = mu.zip_map(&nu, |m, v| {
            let denom = v.affine(1.0 / bc2, 0.0)?.sqrt()?.affine(1.0, eps)?;
            m.affine(-lr / bc1, 0.0)? / denom
        })?;

        Ok((
            updates,
            AdamState {
                count: state.count + 1,
                mu,
                nu,
            },
        ))
    }
}

/// Rescales gradients whose global norm exceeds `max_norm`.
pub fn clip_by_global_norm(grads: &NamedTensors, max_norm: f64) -> Result<NamedTensors> {
    let norm = grads.global_norm()? as f64;
    if norm > max_norm {
        grads.scale(max_norm / norm)
    } else {
        Ok(grads.clone())
    }
}

/// `params + updates`.
pub fn apply_updates(params: &NamedTensors, updates: &NamedTensors) -> Result<NamedTensors> {
    params.zip_map(updates, |p, u| p + u)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{Device, Tensor};

    fn tree(v: &[f32]) -> NamedTensors {
        let mut t = NamedTensors::new();
        t.insert("w", Tensor::new(v, &Device::Cpu).unwrap());
        t
    }

    fn values(t: &NamedTensors) -> Vec<f32> {
        t.get("w").unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn test_clip_by_global_norm() -> Result<()> {
        let g = tree(&[3.0, 4.0]);
        assert_eq!(values(&clip_by_global_norm(&g, 10.0)?), vec![3.0, 4.0]);
        let clipped = values(&clip_by_global_norm(&g, 1.0)?);
        assert!((clipped[0] - 0.6).abs() < 1e-6);
        assert!((clipped[1] - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() -> Result<()> {
        // With bias correction the first Adam step is lr * sign(g), up to eps.
        let adam = Adam::new(OptimizerConfig::default().learning_rate(0.1).eps(1e-8).max_grad_norm(1e3));
        let params = tree(&[1.0, 1.0]);
        let state = adam.init(&params)?;
        let (updates, state) = adam.update(&tree(&[2.0, -0.5]), state)?;
        let new_params = values(&apply_updates(&params, &updates)?);
        assert_eq!(state.count, 1);
        assert!((new_params[0] - 0.9).abs() < 1e-5);
        assert!((new_params[1] - 1.1).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_update_is_pure() -> Result<()> {
        let adam = Adam::new(OptimizerConfig::default());
        let params = tree(&[0.5, -0.5]);
        let state = adam.init(&params)?;
        let g = tree(&[0.1, 0.2]);
        let (u1, s1) = adam.update(&g, state.clone())?;
        let (u2, s2) = adam.update(&g, state)?;
        assert_eq!(values(&u1), values(&u2));
        assert_eq!(values(&s1.nu), values(&s2.nu));
        Ok(())
    }

    #[test]
    fn test_linear_decay() {
        let adam = Adam::new(OptimizerConfig::default().learning_rate(1.0).lr_schedule(
            LrSchedule::LinearDecay {
                opt_steps_per_update: 10,
                num_updates: 4,
            },
        ));
        assert_eq!(adam.learning_rate(0), 1.0);
        assert_eq!(adam.learning_rate(9), 1.0);
        assert_eq!(adam.learning_rate(10), 0.75);
        assert_eq!(adam.learning_rate(39), 0.25);
    }
}
