use crate::{ActionSpec, Env, PrngKey, TimeStep};
use anyhow::{ensure, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration of [`PointMass`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PointMassConfig {
    /// Dimension of the position and action vectors.
    pub dim: usize,

    /// Displacement per step for a unit action.
    pub step_size: f32,

    /// Initial positions are drawn uniformly from `[-init_range, init_range]`.
    pub init_range: f32,

    /// If set, episodes terminate (zero discount) after this many steps.
    pub episode_length: Option<u32>,
}

impl Default for PointMassConfig {
    fn default() -> Self {
        Self {
            dim: 1,
            step_size: 0.1,
            init_range: 1.0,
            episode_length: None,
        }
    }
}

impl PointMassConfig {
    /// Sets the dimension.
    pub fn dim(mut self, v: usize) -> Self {
        self.dim = v;
        self
    }

    /// Sets the number of steps after which episodes terminate.
    pub fn episode_length(mut self, v: Option<u32>) -> Self {
        self.episode_length = v;
        self
    }
}

/// State of [`PointMass`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointMassState {
    /// Position.
    pub pos: Vec<f32>,

    /// Steps taken in the current episode.
    pub steps: u32,
}

/// A point moved by bounded velocity commands, rewarded for staying near the origin.
///
/// Without `episode_length` the environment never terminates.
#[derive(Debug, Clone)]
pub struct PointMass {
    config: PointMassConfig,
}

impl PointMass {
    /// Creates the environment.
    pub fn new(config: PointMassConfig) -> Self {
        Self { config }
    }
}

impl Env for PointMass {
    type State = PointMassState;

    fn obs_dim(&self) -> usize {
        self.config.dim
    }

    fn action_spec(&self) -> ActionSpec {
        ActionSpec {
            dim: self.config.dim,
            minimum: -1.0,
            maximum: 1.0,
        }
    }

    fn reset(&self, key: PrngKey) -> Result<(Self::State, TimeStep)> {
        let mut rng = key.rng();
        let r = self.config.init_range;
        let pos: Vec<f32> = (0..self.config.dim)
            .map(|_| if r > 0.0 { rng.gen_range(-r..r) } else { 0.0 })
            .collect();
        let timestep = TimeStep::restart(pos.clone());
        Ok((PointMassState { pos, steps: 0 }, timestep))
    }

    fn step(&self, state: Self::State, act: &[f32]) -> Result<(Self::State, TimeStep)> {
        ensure!(
            act.len() == self.config.dim,
            "expected action of dimension {}, got {}",
            self.config.dim,
            act.len()
        );
        let pos: Vec<f32> = state
            .pos
            .iter()
            .zip(act.iter())
            .map(|(p, a)| p + self.config.step_size * a.clamp(-1.0, 1.0))
            .collect();
        let reward = -pos.iter().map(|p| p * p).sum::<f32>();
        let steps = state.steps + 1;
        let timestep = match self.config.episode_length {
            Some(n) if steps >= n => TimeStep::termination(pos.clone(), reward),
            _ => TimeStep::transition(pos.clone(), reward),
        };
        Ok((PointMassState { pos, steps }, timestep))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_terminates_after_episode_length() -> Result<()> {
        let env = PointMass::new(PointMassConfig::default().episode_length(Some(2)));
        let (state, ts) = env.reset(PrngKey::new(1))?;
        assert!(ts.is_first());
        let (state, ts) = env.step(state, &[1.0])?;
        assert!(!ts.is_last());
        let (_, ts) = env.step(state, &[1.0])?;
        assert!(ts.is_last() && ts.is_terminated());
        Ok(())
    }

    #[test]
    fn test_step_moves_towards_action() -> Result<()> {
        let env = PointMass::new(PointMassConfig::default().dim(2));
        let (state, _) = env.reset(PrngKey::new(3))?;
        let before = state.pos.clone();
        let (state, ts) = env.step(state, &[5.0, -1.0])?;
        assert!((state.pos[0] - before[0] - 0.1).abs() < 1e-6);
        assert!((state.pos[1] - before[1] + 0.1).abs() < 1e-6);
        assert!(ts.reward <= 0.0);
        assert!(env.step(state, &[0.0]).is_err());
        Ok(())
    }
}
