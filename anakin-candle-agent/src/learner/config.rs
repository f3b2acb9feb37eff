//! Configuration of the PPO learner.
use crate::{
    actor::ActorConfig,
    critic::CriticConfig,
    opt::{LrSchedule, OptimizerConfig},
    Device,
};
use anakin_core::error::AnakinError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PpoLearner`](super::PpoLearner).
///
/// The learner runs `devices.len() * update_batch_size` replicas, each stepping
/// `num_envs` environments for `rollout_length` steps per update step.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct LearnerConfig {
    /// Devices on which replicas run.
    pub devices: Vec<Device>,

    /// Number of replicas per device.
    pub update_batch_size: usize,

    /// Number of environments stepped by each replica.
    pub num_envs: usize,

    /// Horizon of a rollout.
    pub rollout_length: usize,

    /// Number of epochs over one rollout.
    pub epochs: usize,

    /// Number of critic and Q minibatches in an epoch.
    pub num_critic_minibatches: usize,

    /// Number of actor minibatches in an epoch.
    pub num_actor_minibatches: usize,

    /// Size of critic and Q minibatches.
    pub critic_minibatch_size: usize,

    /// Size of actor minibatches.
    pub actor_minibatch_size: usize,

    /// Discount factor.
    pub gamma: f64,

    /// Entropy temperature in value targets and advantages.
    pub alpha: f64,

    /// Clipping range of the probability ratio.
    pub clip_eps: f64,

    /// Coefficient of the value loss.
    pub vf_coef: f64,

    /// Coefficient of the entropy bonus of the actor loss.
    pub ent_coef: f64,

    /// Maximum global norm of gradients.
    pub max_grad_norm: f64,

    /// Learning rate of the actor.
    pub actor_lr: f64,

    /// Learning rate of the critic.
    pub critic_lr: f64,

    /// Learning rate of the Q-function.
    pub q_lr: f64,

    /// Epsilon of Adam.
    pub adam_eps: f64,

    /// If `true`, learning rates decay linearly to zero over the training run.
    pub decay_learning_rates: bool,

    /// Actor network.
    pub actor: ActorConfig,

    /// Critic network.
    pub critic: CriticConfig,

    /// Q network.
    pub q: CriticConfig,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            devices: vec![Device::Cpu],
            update_batch_size: 1,
            num_envs: 16,
            rollout_length: 16,
            epochs: 4,
            num_critic_minibatches: 128,
            num_actor_minibatches: 32,
            critic_minibatch_size: 512,
            actor_minibatch_size: 512,
            gamma: 0.99,
            alpha: 0.1,
            clip_eps: 0.2,
            vf_coef: 0.5,
            ent_coef: 0.0,
            max_grad_norm: 0.5,
            actor_lr: 3e-4,
            critic_lr: 3e-4,
            q_lr: 3e-4,
            adam_eps: 1e-5,
            decay_learning_rates: false,
            actor: ActorConfig::default(),
            critic: CriticConfig::default(),
            q: CriticConfig::default(),
        }
    }
}

impl LearnerConfig {
    /// Sets the devices.
    pub fn devices(mut self, v: Vec<Device>) -> Self {
        self.devices = v;
        self
    }

    /// Sets the number of replicas per device.
    pub fn update_batch_size(mut self, v: usize) -> Self {
        self.update_batch_size = v;
        self
    }

    /// Sets the number of environments of a replica.
    pub fn num_envs(mut self, v: usize) -> Self {
        self.num_envs = v;
        self
    }

    /// Sets the rollout horizon.
    pub fn rollout_length(mut self, v: usize) -> Self {
        self.rollout_length = v;
        self
    }

    /// Sets the number of epochs.
    pub fn epochs(mut self, v: usize) -> Self {
        self.epochs = v;
        self
    }

    /// Sets the number and size of critic and Q minibatches.
    pub fn critic_minibatches(mut self, num: usize, size: usize) -> Self {
        self.num_critic_minibatches = num;
        self.critic_minibatch_size = size;
        self
    }

    /// Sets the number and size of actor minibatches.
    pub fn actor_minibatches(mut self, num: usize, size: usize) -> Self {
        self.num_actor_minibatches = num;
        self.actor_minibatch_size = size;
        self
    }

    /// Sets the learning rates of actor, critic and Q-function.
    pub fn learning_rates(mut self, actor: f64, critic: f64, q: f64) -> Self {
        self.actor_lr = actor;
        self.critic_lr = critic;
        self.q_lr = q;
        self
    }

    /// Enables linear decay of learning rates.
    pub fn decay_learning_rates(mut self, v: bool) -> Self {
        self.decay_learning_rates = v;
        self
    }

    /// Sets the hidden units of all networks.
    pub fn hidden_units(mut self, units: Vec<usize>) -> Self {
        self.actor = self.actor.units(units.clone());
        self.critic = self.critic.units(units.clone());
        self.q = self.q.units(units);
        self
    }

    /// Checks counts and coefficients.
    pub fn validate(&self) -> Result<(), AnakinError> {
        let positive = [
            ("devices", self.devices.len()),
            ("update_batch_size", self.update_batch_size),
            ("num_envs", self.num_envs),
            ("rollout_length", self.rollout_length),
            ("epochs", self.epochs),
            ("num_critic_minibatches", self.num_critic_minibatches),
            ("num_actor_minibatches", self.num_actor_minibatches),
            ("critic_minibatch_size", self.critic_minibatch_size),
            ("actor_minibatch_size", self.actor_minibatch_size),
        ];
        for (name, v) in positive.iter() {
            if *v == 0 {
                return Err(AnakinError::ConfigError(format!("{} must be positive", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(AnakinError::ConfigError(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if self.clip_eps <= 0.0 || self.max_grad_norm <= 0.0 {
            return Err(AnakinError::ConfigError(
                "clip_eps and max_grad_norm must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Total number of replicas.
    pub fn num_replicas(&self) -> usize {
        self.devices.len() * self.update_batch_size
    }

    /// Number of transitions in the rollout of one replica.
    pub fn rollout_size(&self) -> usize {
        self.rollout_length * self.num_envs
    }

    /// Environment steps of one update step over all replicas.
    pub fn steps_per_update(&self) -> usize {
        self.num_replicas() * self.rollout_size()
    }

    /// Optimizer steps of one update step, counting a joint critic and Q step once.
    pub fn opt_steps_per_update(&self) -> usize {
        self.epochs * (self.num_critic_minibatches + self.num_actor_minibatches)
    }

    fn optimizer(&self, lr: f64, num_minibatches: usize, num_updates: usize) -> OptimizerConfig {
        let lr_schedule = match self.decay_learning_rates {
            false => LrSchedule::Constant,
            true => LrSchedule::LinearDecay {
                opt_steps_per_update: self.epochs * num_minibatches,
                num_updates,
            },
        };
        OptimizerConfig::default()
            .learning_rate(lr)
            .eps(self.adam_eps)
            .max_grad_norm(self.max_grad_norm)
            .lr_schedule(lr_schedule)
    }

    /// Optimizer configurations of actor, critic and Q-function.
    pub fn optimizer_configs(
        &self,
        num_updates: usize,
    ) -> (OptimizerConfig, OptimizerConfig, OptimizerConfig) {
        (
            self.optimizer(self.actor_lr, self.num_actor_minibatches, num_updates),
            self.optimizer(self.critic_lr, self.num_critic_minibatches, num_updates),
            self.optimizer(self.q_lr, self.num_critic_minibatches, num_updates),
        )
    }

    /// Constructs [`LearnerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`LearnerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_learner_config() -> Result<()> {
        let config = LearnerConfig::default()
            .devices(vec![Device::Cpu, Device::Cuda(1)])
            .update_batch_size(4)
            .hidden_units(vec![64, 64]);

        let dir = TempDir::new("learner_config")?;
        let path = dir.path().join("learner_config.yaml");
        config.save(&path)?;
        let config_ = LearnerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_counts() {
        let config = LearnerConfig::default()
            .devices(vec![Device::Cpu, Device::Cpu])
            .update_batch_size(4)
            .num_envs(4)
            .rollout_length(16)
            .epochs(2);
        assert_eq!(config.num_replicas(), 8);
        assert_eq!(config.rollout_size(), 64);
        assert_eq!(config.steps_per_update(), 512);
        assert_eq!(config.opt_steps_per_update(), 2 * (128 + 32));
    }

    #[test]
    fn test_decay_counts_steps_of_each_group() {
        let config = LearnerConfig::default().epochs(2).decay_learning_rates(true);
        let (actor, critic, q) = config.optimizer_configs(10);
        assert_eq!(
            actor.lr_schedule,
            LrSchedule::LinearDecay {
                opt_steps_per_update: 64,
                num_updates: 10
            }
        );
        assert_eq!(critic.lr_schedule, q.lr_schedule);
        assert_eq!(
            critic.lr_schedule,
            LrSchedule::LinearDecay {
                opt_steps_per_update: 256,
                num_updates: 10
            }
        );
    }

    #[test]
    fn test_zero_counts_are_rejected() {
        assert!(LearnerConfig::default().epochs(0).validate().is_err());
        assert!(LearnerConfig::default().devices(vec![]).validate().is_err());
        assert!(LearnerConfig::default().validate().is_ok());
    }
}
