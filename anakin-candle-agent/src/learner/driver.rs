use super::{
    collect, EpochScheduler, GradientReducer, LearnerConfig, LearnerState, Networks, Optimizers,
};
use anakin_core::{record::Record, Env, EpisodeMetrics};
use anyhow::Result;
use candle_core::Device;

/// Everything a replica needs besides its own state.
pub struct ReplicaContext<'a, E> {
    /// Environment shared by all replicas.
    pub env: &'a E,

    /// Networks.
    pub nets: &'a Networks,

    /// Optimizers.
    pub optimizers: &'a Optimizers,

    /// Configuration.
    pub config: &'a LearnerConfig,

    /// Device holding the replica's tensors.
    pub device: &'a Device,
}

/// Output of [`update_step`].
pub struct UpdateOutput<S> {
    /// State after the update step.
    pub state: LearnerState<S>,

    /// Episode metrics of every transition of the rollout.
    pub episode_metrics: Vec<EpisodeMetrics>,

    /// Per-minibatch loss infos.
    pub train_metrics: Record,
}

/// One update step of a replica: rollout, then the epochs over it.
pub fn update_step<E: Env>(
    ctx: &ReplicaContext<'_, E>,
    reducer: &dyn GradientReducer,
    state: LearnerState<E::State>,
) -> Result<UpdateOutput<E::State>> {
    let (state, batch) = collect(
        ctx.env,
        ctx.nets,
        ctx.device,
        ctx.config.rollout_length,
        state,
    )?;

    let LearnerState {
        params,
        opt_states,
        key,
        env_states,
        timesteps,
    } = state;
    let scheduler = EpochScheduler {
        nets: ctx.nets,
        optimizers: ctx.optimizers,
        config: ctx.config,
        reducer,
    };
    let output = scheduler.run(params, opt_states, key, &batch)?;

    Ok(UpdateOutput {
        state: LearnerState {
            params: output.params,
            opt_states: output.opt_states,
            key: output.key,
            env_states,
            timesteps,
        },
        episode_metrics: batch.info,
        train_metrics: output.metrics,
    })
}

/// Output of [`run_replica`].
pub struct ReplicaOutput<S> {
    /// State after the last update step.
    pub state: LearnerState<S>,

    /// Episode metrics, one entry per update step.
    pub episode_metrics: Vec<Vec<EpisodeMetrics>>,

    /// Loss infos, one record per update step.
    pub train_metrics: Vec<Record>,
}

/// Runs `num_updates` update steps of one replica, threading its state forward.
///
/// The reducer is consumed so that the replica leaves the barrier when done.
pub fn run_replica<E, R>(
    ctx: &ReplicaContext<'_, E>,
    reducer: R,
    state: LearnerState<E::State>,
    num_updates: usize,
) -> Result<ReplicaOutput<E::State>>
where
    E: Env,
    R: GradientReducer,
{
    let mut state = state;
    let mut episode_metrics = Vec::with_capacity(num_updates);
    let mut train_metrics = Vec::with_capacity(num_updates);

    for _ in 0..num_updates {
        let output = update_step(ctx, &reducer, state)?;
        state = output.state;
        episode_metrics.push(output.episode_metrics);
        train_metrics.push(output.train_metrics);
    }

    Ok(ReplicaOutput {
        state,
        episode_metrics,
        train_metrics,
    })
}
