use super::{Networks, ParameterSet, TrajectoryBatch};
use anakin_core::PrngKey;
use anyhow::Result;
use candle_core::Tensor;

/// Soft advantages of the transitions of a batch.
///
/// `A = Q(obs, action) - V(obs) + alpha * (-log_prob - entropy(obs))`, where
/// `log_prob` is the log probability recorded at acting time and the other terms
/// are evaluated with the given parameters. The result carries no gradient.
pub fn advantages(
    nets: &Networks,
    params: &ParameterSet,
    batch: &TrajectoryBatch,
    alpha: f64,
    key: PrngKey,
) -> Result<Tensor> {
    let v = nets.critic.forward(&params.critic, &batch.obs)?;
    let q = nets.q.forward(&params.q, &batch.obs, &batch.action)?;
    let entropy = nets.actor.forward(&params.actor, &batch.obs)?.entropy(key)?;
    let bonus = (batch.log_prob.neg()? - entropy)?.affine(alpha, 0.0)?;
    Ok(((q - v)? + bonus)?.detach())
}
