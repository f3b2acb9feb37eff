use super::{LearnerState, Networks, TrajectoryBatch, Transition};
use crate::util::{flags_to_tensor, rows_to_tensor, vec_to_tensor};
use anakin_core::{Env, TimeStep};
use anyhow::Result;
use candle_core::Device;
use log::trace;

/// Steps the environments of a replica for `rollout_length` steps with its current policy.
///
/// Each step splits a fresh policy key from the replica's key, samples actions,
/// evaluates the critic at the current observations and steps all environments.
/// Parameters and optimizer states are passed through unchanged.
pub fn collect<E: Env>(
    env: &E,
    nets: &Networks,
    device: &Device,
    rollout_length: usize,
    state: LearnerState<E::State>,
) -> Result<(LearnerState<E::State>, TrajectoryBatch)> {
    let LearnerState {
        params,
        opt_states,
        mut key,
        mut env_states,
        mut timesteps,
    } = state;
    let obs_dim = env.obs_dim();
    let act_dim = env.action_spec().dim;
    let mut transitions = Vec::with_capacity(rollout_length);

    for _ in 0..rollout_length {
        let (next_key, policy_key) = key.split();
        key = next_key;

        let obs_rows: Vec<Vec<f32>> = timesteps.iter().map(|t| t.observation.clone()).collect();
        let obs = rows_to_tensor(&obs_rows, obs_dim, device)?;
        let policy = nets.actor.forward(&params.actor, &obs)?;
        let value = nets.critic.forward(&params.critic, &obs)?;
        let action = policy.sample(policy_key)?;
        let log_prob = policy.log_prob(&action)?;

        let acts = action.to_vec2::<f32>()?;
        let (next_env_states, next_timesteps) = env.step_batch(env_states, &acts)?;
        env_states = next_env_states;
        timesteps = next_timesteps;

        let done: Vec<bool> = timesteps.iter().map(TimeStep::is_terminated).collect();
        let truncated: Vec<bool> = timesteps.iter().map(TimeStep::is_truncated).collect();
        let next_obs: Vec<Vec<f32>> = timesteps
            .iter()
            .map(|t| t.next_observation().to_vec())
            .collect();

        transitions.push(Transition {
            done: flags_to_tensor(&done, device)?,
            truncated: flags_to_tensor(&truncated, device)?,
            action: rows_to_tensor(&acts, act_dim, device)?,
            value: value.detach(),
            reward: vec_to_tensor(timesteps.iter().map(|t| t.reward).collect(), device)?,
            log_prob: log_prob.detach(),
            obs,
            next_obs: rows_to_tensor(&next_obs, obs_dim, device)?,
            info: timesteps.iter().map(|t| t.extras.episode_metrics).collect(),
        });
    }
    trace!("Collected {} steps of {} environments", rollout_length, timesteps.len());

    let batch = TrajectoryBatch::from_transitions(transitions)?;
    Ok((
        LearnerState {
            params,
            opt_states,
            key,
            env_states,
            timesteps,
        },
        batch,
    ))
}
