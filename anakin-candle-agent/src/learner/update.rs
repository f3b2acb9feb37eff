use super::{
    loss::{actor_loss, critic_loss, q_loss},
    GradientReducer, LearnerConfig, Networks, OptStates, ParameterSet, TrajectoryBatch,
};
use crate::{
    opt::{apply_updates, Adam},
    util::NamedTensors,
};
use anakin_core::{PrngKey, TrainSchedule};
use anyhow::Result;
use candle_core::Tensor;

/// Optimizers of actor, critic and Q-function.
#[derive(Clone, Debug)]
pub struct Optimizers {
    /// Actor optimizer.
    pub actor: Adam,

    /// Critic optimizer.
    pub critic: Adam,

    /// Q-function optimizer.
    pub q: Adam,
}

impl Optimizers {
    /// Builds the optimizers; learning rate decay spans `schedule.num_updates` update steps.
    pub fn build(config: &LearnerConfig, schedule: &TrainSchedule) -> Self {
        let (actor, critic, q) = config.optimizer_configs(schedule.num_updates);
        Self {
            actor: Adam::new(actor),
            critic: Adam::new(critic),
            q: Adam::new(q),
        }
    }

    /// Zero optimizer states for the given parameters.
    pub fn init(&self, params: &ParameterSet) -> Result<OptStates> {
        Ok(OptStates {
            actor: self.actor.init(&params.actor)?,
            critic: self.critic.init(&params.critic)?,
            q: self.q.init(&params.q)?,
        })
    }
}

/// Gradient of `loss_fn` with respect to `params`.
fn grad<F>(params: &NamedTensors, loss_fn: F) -> Result<(NamedTensors, NamedTensors)>
where
    F: FnOnce(&NamedTensors) -> Result<(Tensor, NamedTensors)>,
{
    let tracked = params.track()?;
    let (loss, info) = loss_fn(&tracked)?;
    let grads = tracked.grads(&loss.backward()?)?;
    Ok((grads, info))
}

/// One joint step of critic and Q-function on a minibatch.
///
/// Both gradients and the loss infos are averaged across replicas in a single
/// reduction before either optimizer is applied. Returns the averaged loss infos.
#[allow(clippy::too_many_arguments)]
pub fn update_critics(
    nets: &Networks,
    optimizers: &Optimizers,
    config: &LearnerConfig,
    reducer: &dyn GradientReducer,
    params: ParameterSet,
    opt_states: OptStates,
    batch: &TrajectoryBatch,
    critic_loss_key: PrngKey,
    q_loss_key: PrngKey,
) -> Result<(ParameterSet, OptStates, NamedTensors)> {
    let (critic_grads, critic_info) = grad(&params.critic, |critic_params| {
        critic_loss(nets, critic_params, &params.actor, batch, config, critic_loss_key)
    })?;
    let (q_grads, q_info) = grad(&params.q, |q_params| {
        q_loss(nets, q_params, &params.actor, batch, config, q_loss_key)
    })?;

    let reduced = reducer.all_reduce_mean(
        critic_grads
            .prefixed("critic/")
            .union(q_grads.prefixed("q/"))
            .union(critic_info.union(q_info).prefixed("info/")),
    )?;

    let (critic_updates, critic_opt_state) = optimizers
        .critic
        .update(&reduced.strip_prefix("critic/"), opt_states.critic)?;
    let (q_updates, q_opt_state) = optimizers
        .q
        .update(&reduced.strip_prefix("q/"), opt_states.q)?;

    let params = ParameterSet {
        critic: apply_updates(&params.critic, &critic_updates)?,
        q: apply_updates(&params.q, &q_updates)?,
        ..params
    };
    let opt_states = OptStates {
        critic: critic_opt_state,
        q: q_opt_state,
        ..opt_states
    };
    Ok((params, opt_states, reduced.strip_prefix("info/")))
}

/// One actor step on a minibatch with its advantages.
#[allow(clippy::too_many_arguments)]
pub fn update_actor(
    nets: &Networks,
    optimizers: &Optimizers,
    config: &LearnerConfig,
    reducer: &dyn GradientReducer,
    params: ParameterSet,
    opt_states: OptStates,
    batch: &TrajectoryBatch,
    advantages: &Tensor,
    actor_loss_key: PrngKey,
) -> Result<(ParameterSet, OptStates, NamedTensors)> {
    let (actor_grads, actor_info) = grad(&params.actor, |actor_params| {
        actor_loss(nets, actor_params, batch, advantages, config, actor_loss_key)
    })?;

    let reduced = reducer.all_reduce_mean(
        actor_grads
            .prefixed("actor/")
            .union(actor_info.prefixed("info/")),
    )?;

    let (actor_updates, actor_opt_state) = optimizers
        .actor
        .update(&reduced.strip_prefix("actor/"), opt_states.actor)?;

    let params = ParameterSet {
        actor: apply_updates(&params.actor, &actor_updates)?,
        ..params
    };
    let opt_states = OptStates {
        actor: actor_opt_state,
        ..opt_states
    };
    Ok((params, opt_states, reduced.strip_prefix("info/")))
}
