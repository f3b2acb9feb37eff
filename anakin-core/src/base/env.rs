//! Environment.
use super::TimeStep;
use crate::PrngKey;
use anyhow::{ensure, Result};

/// Shape and bounds of a continuous action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSpec {
    /// Dimension of the action vector.
    pub dim: usize,

    /// Lower bound, shared by all action dimensions.
    pub minimum: f32,

    /// Upper bound, shared by all action dimensions.
    pub maximum: f32,
}

/// A functional environment with continuous actions.
///
/// The environment object only carries configuration. All mutable state lives
/// in [`Env::State`], which is threaded through [`Env::reset`] and [`Env::step`]
/// by value, so a single environment object can be shared by every replica.
pub trait Env: Send + Sync {
    /// State of a single environment instance.
    type State: Clone + Send;

    /// Dimension of observations.
    fn obs_dim(&self) -> usize;

    /// Action specification.
    fn action_spec(&self) -> ActionSpec;

    /// Starts a new episode.
    fn reset(&self, key: PrngKey) -> Result<(Self::State, TimeStep)>;

    /// Advances the environment by one step.
    fn step(&self, state: Self::State, act: &[f32]) -> Result<(Self::State, TimeStep)>;

    /// Resets a batch of environment instances, one per key.
    fn reset_batch(&self, keys: &[PrngKey]) -> Result<(Vec<Self::State>, Vec<TimeStep>)> {
        let mut states = Vec::with_capacity(keys.len());
        let mut timesteps = Vec::with_capacity(keys.len());
        for key in keys {
            let (state, timestep) = self.reset(*key)?;
            states.push(state);
            timesteps.push(timestep);
        }
        Ok((states, timesteps))
    }

    /// Steps a batch of environment instances; `acts` holds one row per instance.
    fn step_batch(
        &self,
        states: Vec<Self::State>,
        acts: &[Vec<f32>],
    ) -> Result<(Vec<Self::State>, Vec<TimeStep>)> {
        ensure!(
            states.len() == acts.len(),
            "{} environment states but {} actions",
            states.len(),
            acts.len()
        );
        let mut next_states = Vec::with_capacity(states.len());
        let mut timesteps = Vec::with_capacity(states.len());
        for (state, act) in states.into_iter().zip(acts.iter()) {
            let (state, timestep) = self.step(state, act)?;
            next_states.push(state);
            timesteps.push(timestep);
        }
        Ok((next_states, timesteps))
    }
}
