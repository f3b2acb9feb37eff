use crate::{
    actor::Actor,
    util::{rows_to_tensor, NamedTensors},
};
use anakin_core::{
    evaluator::{run_episodes, EvalOutput, Evaluator},
    Env, PrngKey,
};
use anyhow::Result;
use candle_core::Device;

/// Runs the actor on an evaluation environment.
///
/// Actions are drawn from the policy, or taken at its mode if `greedy` is set.
pub struct ActorEvaluator<E> {
    env: E,
    actor: Actor,
    device: Device,
    greedy: bool,
    max_steps: u32,
}

impl<E: Env> ActorEvaluator<E> {
    /// Episodes are cut after `max_steps` steps.
    pub fn new(env: E, actor: Actor, device: Device, max_steps: u32) -> Self {
        Self {
            env,
            actor,
            device,
            greedy: false,
            max_steps,
        }
    }

    /// Act at the mode of the policy.
    pub fn greedy(mut self, v: bool) -> Self {
        self.greedy = v;
        self
    }
}

impl<E: Env> Evaluator<NamedTensors> for ActorEvaluator<E> {
    fn evaluate(&mut self, params: &NamedTensors, key: PrngKey, n_episodes: usize) -> Result<EvalOutput> {
        let (env_key, mut act_key) = key.split();
        let params = params.to_device(&self.device)?;
        let obs_dim = self.env.obs_dim();
        let actor = &self.actor;
        let device = &self.device;
        let greedy = self.greedy;

        run_episodes(&self.env, env_key, n_episodes, self.max_steps, |obs| {
            let (next_key, policy_key) = act_key.split();
            act_key = next_key;
            let obs = rows_to_tensor(obs, obs_dim, device)?;
            let policy = actor.forward(&params, &obs)?;
            let action = match greedy {
                true => policy.mode()?,
                false => policy.sample(policy_key)?,
            };
            Ok(action.to_vec2::<f32>()?)
        })
    }
}
