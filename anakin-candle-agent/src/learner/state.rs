use crate::{opt::AdamState, util::NamedTensors};
use anakin_core::{PrngKey, TimeStep};
use anyhow::{anyhow, Result};
use candle_core::Device;

const ACTOR: &str = "actor.";
const CRITIC: &str = "critic.";
const Q: &str = "q.";

/// Parameters of actor, critic and Q-function.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    /// Actor parameters.
    pub actor: NamedTensors,

    /// Critic parameters.
    pub critic: NamedTensors,

    /// Q-function parameters.
    pub q: NamedTensors,
}

impl ParameterSet {
    /// Flattens the three groups into a single tree with prefixed names.
    pub fn to_named_tensors(&self) -> NamedTensors {
        self.actor
            .prefixed(ACTOR)
            .union(self.critic.prefixed(CRITIC))
            .union(self.q.prefixed(Q))
    }

    /// Inverse of [`ParameterSet::to_named_tensors`].
    pub fn from_named_tensors(tree: &NamedTensors) -> Result<Self> {
        let params = Self {
            actor: tree.strip_prefix(ACTOR),
            critic: tree.strip_prefix(CRITIC),
            q: tree.strip_prefix(Q),
        };
        if params.actor.is_empty() || params.critic.is_empty() || params.q.is_empty() {
            return Err(anyhow!("Parameter tree lacks one of actor, critic or q"));
        }
        Ok(params)
    }

    /// Copies the parameters to a device.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            actor: self.actor.to_device(device)?,
            critic: self.critic.to_device(device)?,
            q: self.q.to_device(device)?,
        })
    }

    /// Largest absolute difference over all parameters.
    pub fn max_abs_diff(&self, other: &Self) -> Result<f32> {
        Ok(self
            .actor
            .max_abs_diff(&other.actor)?
            .max(self.critic.max_abs_diff(&other.critic)?)
            .max(self.q.max_abs_diff(&other.q)?))
    }
}

/// Optimizer states of actor, critic and Q-function.
#[derive(Clone, Debug)]
pub struct OptStates {
    /// Actor optimizer state.
    pub actor: AdamState,

    /// Critic optimizer state.
    pub critic: AdamState,

    /// Q-function optimizer state.
    pub q: AdamState,
}

impl OptStates {
    /// Step counters of actor, critic and Q-function.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.actor.count, self.critic.count, self.q.count)
    }

    /// Moment estimates of the three groups in a single tree.
    pub fn moments(&self) -> NamedTensors {
        let group = |s: &AdamState| s.mu.prefixed("mu.").union(s.nu.prefixed("nu."));
        group(&self.actor)
            .prefixed(ACTOR)
            .union(group(&self.critic).prefixed(CRITIC))
            .union(group(&self.q).prefixed(Q))
    }
}

/// State of one replica, threaded through update steps by value.
#[derive(Clone, Debug)]
pub struct LearnerState<S> {
    /// Network parameters.
    pub params: ParameterSet,

    /// Optimizer states.
    pub opt_states: OptStates,

    /// Key of the replica's random stream.
    pub key: PrngKey,

    /// States of the replica's environments.
    pub env_states: Vec<S>,

    /// Latest time steps of the replica's environments.
    pub timesteps: Vec<TimeStep>,
}

/// Learner states of all replicas, indexed by device and then by batch replica.
#[derive(Clone, Debug)]
pub struct ReplicatedState<S> {
    /// `replicas[d][b]` is the `b`-th batch replica on the `d`-th device.
    pub replicas: Vec<Vec<LearnerState<S>>>,
}

impl<S> ReplicatedState<S> {
    /// The first replica. After every update step all replicas share its parameters.
    pub fn first(&self) -> Result<&LearnerState<S>> {
        self.replicas
            .first()
            .and_then(|r| r.first())
            .ok_or_else(|| anyhow!("Replicated state without replicas"))
    }

    /// Iterates over all replicas in device-major order.
    pub fn iter(&self) -> impl Iterator<Item = &LearnerState<S>> {
        self.replicas.iter().flatten()
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.iter().map(|r| r.len()).sum()
    }

    /// `true` if there is no replica.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
