use super::{LearnerConfig, ParameterSet};
use crate::{
    actor::Actor,
    critic::{QNet, ValueNet},
};
use anakin_core::{ActionSpec, PrngKey};
use anyhow::Result;
use candle_core::Device;

/// Actor, critic and Q networks of the learner.
///
/// The networks hold no parameters; see [`ParameterSet`].
#[derive(Debug, Clone)]
pub struct Networks {
    /// Policy.
    pub actor: Actor,

    /// State-value function.
    pub critic: ValueNet,

    /// State-action-value function.
    pub q: QNet,
}

impl Networks {
    /// Builds the networks for the given observation dimension and action specification.
    pub fn build(config: &LearnerConfig, obs_dim: usize, spec: ActionSpec) -> Self {
        Self {
            actor: Actor::build(&config.actor, obs_dim, spec),
            critic: ValueNet::build(&config.critic, obs_dim),
            q: QNet::build(&config.q, obs_dim, spec.dim),
        }
    }

    /// Initializes the three parameter groups from independent keys.
    pub fn init(&self, key: PrngKey, device: &Device) -> Result<ParameterSet> {
        let keys = key.split_n(3);
        Ok(ParameterSet {
            actor: self.actor.init(keys[0], device)?,
            critic: self.critic.init(keys[1], device)?,
            q: self.q.init(keys[2], device)?,
        })
    }
}
