//! Loss functions.
//!
//! Each function returns the scalar loss to be differentiated and a tree of
//! scalar loss infos, which is averaged across replicas together with the gradients.
use super::{LearnerConfig, Networks, TrajectoryBatch};
use crate::util::{gamma_not_done, NamedTensors};
use anakin_core::PrngKey;
use anyhow::Result;
use candle_core::Tensor;

fn info(entries: &[(&str, &Tensor)]) -> NamedTensors {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.detach()))
        .collect()
}

/// Value regression towards the soft one-step target
/// `r + gamma * (1 - done) * (V(next_obs) + alpha * entropy(obs))`.
///
/// Returns `vf_coef * value_loss`. Gradients flow only through `V(obs)`.
pub fn critic_loss(
    nets: &Networks,
    critic_params: &NamedTensors,
    actor_params: &NamedTensors,
    batch: &TrajectoryBatch,
    config: &LearnerConfig,
    key: PrngKey,
) -> Result<(Tensor, NamedTensors)> {
    let value = nets.critic.forward(critic_params, &batch.obs)?;
    let entropy = nets.actor.forward(actor_params, &batch.obs)?.entropy(key)?;
    let next_value = nets.critic.forward(critic_params, &batch.next_obs)?;

    let bootstrap = (next_value + entropy.affine(config.alpha, 0.0)?)?;
    let targets = (&batch.reward + (gamma_not_done(config.gamma, &batch.done)? * bootstrap)?)?;
    let value_loss = ((value - targets.detach())?.sqr()?.mean_all()? * 0.5)?;
    let total_loss = (&value_loss * config.vf_coef)?;

    Ok((total_loss, info(&[("value_loss", &value_loss)])))
}

/// Soft Q regression towards `r + gamma * (1 - done) * (Q(next_obs, a') - alpha * log pi(a'|next_obs))`
/// with `a'` drawn from the actor.
pub fn q_loss(
    nets: &Networks,
    q_params: &NamedTensors,
    actor_params: &NamedTensors,
    batch: &TrajectoryBatch,
    config: &LearnerConfig,
    key: PrngKey,
) -> Result<(Tensor, NamedTensors)> {
    let q_old_action = nets.q.forward(q_params, &batch.obs, &batch.action)?;

    let next_policy = nets.actor.forward(actor_params, &batch.next_obs)?;
    let next_action = next_policy.sample(key)?;
    let next_log_p = next_policy.log_prob(&next_action)?;
    let next_q = nets.q.forward(q_params, &batch.next_obs, &next_action)?;

    let bootstrap = (&next_q - next_log_p.affine(config.alpha, 0.0)?)?;
    let target_q = (&batch.reward + (gamma_not_done(config.gamma, &batch.done)? * bootstrap)?)?;
    let q_error = (q_old_action - target_q.detach())?;
    let q_loss = (q_error.sqr()?.mean_all()? * 0.5)?;

    let q_error_abs = q_error.abs()?.mean_all()?;
    let q1_pred = next_q.mean_all()?;
    let info = info(&[
        ("q_loss", &q_loss),
        ("q_error", &q_error_abs),
        ("q1_pred", &q1_pred),
    ]);
    Ok((q_loss, info))
}

/// Clipped surrogate objective of PPO, negated to be minimized.
pub fn ppo_clip_loss(
    log_prob: &Tensor,
    old_log_prob: &Tensor,
    advantages: &Tensor,
    clip_eps: f64,
) -> Result<Tensor> {
    let ratio = (log_prob - old_log_prob)?.exp()?;
    let unclipped = (&ratio * advantages)?;
    let clipped = (ratio.clamp(1.0 - clip_eps, 1.0 + clip_eps)? * advantages)?;
    Ok(unclipped.minimum(&clipped)?.mean_all()?.neg()?)
}

/// PPO actor loss against precomputed advantages, minus an optional entropy bonus.
pub fn actor_loss(
    nets: &Networks,
    actor_params: &NamedTensors,
    batch: &TrajectoryBatch,
    advantages: &Tensor,
    config: &LearnerConfig,
    key: PrngKey,
) -> Result<(Tensor, NamedTensors)> {
    let policy = nets.actor.forward(actor_params, &batch.obs)?;
    let log_prob = policy.log_prob(&batch.action)?;
    let loss_actor = ppo_clip_loss(&log_prob, &batch.log_prob, advantages, config.clip_eps)?;
    let entropy = policy.entropy(key)?.mean_all()?;
    let total_loss = (&loss_actor - (&entropy * config.ent_coef)?)?;

    Ok((
        total_loss,
        info(&[("actor_loss", &loss_actor), ("entropy", &entropy)]),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    fn t(v: &[f32]) -> Tensor {
        Tensor::new(v, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_ppo_clip_loss_without_policy_change() -> Result<()> {
        // ratio 1: the loss is minus the mean advantage
        let lp = t(&[-1.0, -2.0]);
        let loss = ppo_clip_loss(&lp, &lp, &t(&[1.0, 3.0]), 0.2)?.to_scalar::<f32>()?;
        assert!((loss + 2.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_ppo_clip_loss_clips_ratio() -> Result<()> {
        // ratio e > 1.2 with positive advantage is clipped to 1.2
        let loss = ppo_clip_loss(&t(&[0.0]), &t(&[-1.0]), &t(&[1.0]), 0.2)?.to_scalar::<f32>()?;
        assert!((loss + 1.2).abs() < 1e-6);

        // with negative advantage the unclipped, more pessimistic term is taken
        let loss = ppo_clip_loss(&t(&[0.0]), &t(&[-1.0]), &t(&[-1.0]), 0.2)?.to_scalar::<f32>()?;
        assert!((loss - std::f32::consts::E).abs() < 1e-5);
        Ok(())
    }
}
