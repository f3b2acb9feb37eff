//! Configuration of [`Trainer`](super::Trainer).
use crate::error::AnakinError;
use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
///
/// Exactly one of `total_timesteps` and `num_updates` must be given; the other is
/// derived from the number of environment steps per update step.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Seed of the root random key.
    pub seed: u64,

    /// Total number of environment steps over all replicas.
    pub total_timesteps: Option<usize>,

    /// Total number of update steps.
    pub num_updates: Option<usize>,

    /// Number of evaluations, evenly spaced over training.
    pub num_evaluation: usize,

    /// Episodes per evaluation.
    pub num_eval_episodes: usize,

    /// If `true`, the best policy found is evaluated again at the end of training.
    pub absolute_metric: bool,

    /// Episodes of the final evaluation of the best policy.
    pub num_absolute_metric_episodes: usize,

    /// If `true`, the learner state is checkpointed after every evaluation.
    pub save_model: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_timesteps: Some(1_000_000),
            num_updates: None,
            num_evaluation: 20,
            num_eval_episodes: 32,
            absolute_metric: true,
            num_absolute_metric_episodes: 320,
            save_model: false,
        }
    }
}

/// Update counts derived from a validated [`TrainerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSchedule {
    /// Total number of update steps.
    pub num_updates: usize,

    /// Total number of environment steps.
    pub total_timesteps: usize,

    /// Update steps between two evaluations.
    pub num_updates_per_eval: usize,

    /// Environment steps between two evaluations.
    pub steps_per_eval: usize,
}

impl TrainerConfig {
    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the total number of environment steps and clears `num_updates`.
    pub fn total_timesteps(mut self, v: usize) -> Self {
        self.total_timesteps = Some(v);
        self.num_updates = None;
        self
    }

    /// Sets the number of update steps and clears `total_timesteps`.
    pub fn num_updates(mut self, v: usize) -> Self {
        self.num_updates = Some(v);
        self.total_timesteps = None;
        self
    }

    /// Sets the number of evaluations.
    pub fn num_evaluation(mut self, v: usize) -> Self {
        self.num_evaluation = v;
        self
    }

    /// Sets the number of episodes per evaluation.
    pub fn num_eval_episodes(mut self, v: usize) -> Self {
        self.num_eval_episodes = v;
        self
    }

    /// Enables or disables the final evaluation of the best policy.
    pub fn absolute_metric(mut self, v: bool) -> Self {
        self.absolute_metric = v;
        self
    }

    /// Sets the number of episodes of the final evaluation of the best policy.
    pub fn num_absolute_metric_episodes(mut self, v: usize) -> Self {
        self.num_absolute_metric_episodes = v;
        self
    }

    /// Enables or disables checkpointing.
    pub fn save_model(mut self, v: bool) -> Self {
        self.save_model = v;
        self
    }

    /// Checks the configuration and derives the update schedule.
    ///
    /// `steps_per_update` is the number of environment steps of one update step
    /// summed over all replicas.
    pub fn validate(&self, steps_per_update: usize) -> Result<TrainSchedule, AnakinError> {
        let err = |msg: String| Err(AnakinError::ConfigError(msg));

        if steps_per_update == 0 {
            return err("an update step must collect at least one environment step".into());
        }
        if self.num_evaluation == 0 {
            return err("num_evaluation must be positive".into());
        }
        if self.num_eval_episodes == 0 {
            return err("num_eval_episodes must be positive".into());
        }
        if self.absolute_metric && self.num_absolute_metric_episodes == 0 {
            return err("num_absolute_metric_episodes must be positive".into());
        }

        let num_updates = match (self.total_timesteps, self.num_updates) {
            (Some(_), Some(_)) => {
                return err("set either total_timesteps or num_updates, not both".into())
            }
            (None, None) => return err("set one of total_timesteps and num_updates".into()),
            (Some(total), None) => {
                if total % steps_per_update != 0 {
                    warn!(
                        "total_timesteps {} is not a multiple of {} steps per update; rounding down",
                        total, steps_per_update
                    );
                }
                total / steps_per_update
            }
            (None, Some(n)) => n,
        };

        if num_updates < self.num_evaluation {
            return err(format!(
                "num_updates ({}) must be at least num_evaluation ({})",
                num_updates, self.num_evaluation
            ));
        }

        let num_updates_per_eval = num_updates / self.num_evaluation;
        if num_updates % self.num_evaluation != 0 {
            warn!(
                "num_updates {} is not a multiple of num_evaluation {}; {} updates are skipped",
                num_updates,
                self.num_evaluation,
                num_updates % self.num_evaluation
            );
        }

        Ok(TrainSchedule {
            num_updates,
            total_timesteps: num_updates * steps_per_update,
            num_updates_per_eval,
            steps_per_eval: num_updates_per_eval * steps_per_update,
        })
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
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
    fn test_serde_trainer_config() -> Result<()> {
        let config = TrainerConfig::default()
            .num_updates(100)
            .num_evaluation(10)
            .save_model(true);

        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer_config.yaml");
        config.save(&path)?;
        let config_ = TrainerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_schedule_from_total_timesteps() {
        // 2 devices x 4 batch replicas x 4 envs x 16 steps
        let steps_per_update = 2 * 4 * 4 * 16;
        let config = TrainerConfig::default()
            .total_timesteps(steps_per_update * 20 + 7)
            .num_evaluation(5);
        let schedule = config.validate(steps_per_update).unwrap();
        assert_eq!(schedule.num_updates, 20);
        assert_eq!(schedule.total_timesteps, steps_per_update * 20);
        assert_eq!(schedule.num_updates_per_eval, 4);
        assert_eq!(schedule.steps_per_eval, 4 * steps_per_update);
    }

    #[test]
    fn test_too_few_updates_is_rejected() {
        let config = TrainerConfig::default().num_updates(3).num_evaluation(5);
        assert!(matches!(
            config.validate(64),
            Err(AnakinError::ConfigError(_))
        ));
    }

    #[test]
    fn test_ambiguous_budget_is_rejected() {
        let mut config = TrainerConfig::default();
        config.num_updates = Some(10);
        config.total_timesteps = Some(1000);
        assert!(config.validate(64).is_err());

        config.num_updates = None;
        config.total_timesteps = None;
        assert!(config.validate(64).is_err());
        assert!(TrainerConfig::default().validate(0).is_err());
    }
}
