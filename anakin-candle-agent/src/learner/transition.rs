use anakin_core::EpisodeMetrics;
use anyhow::{ensure, Result};
use candle_core::Tensor;

/// Environment steps of all environments of a replica at one time step.
///
/// Tensors have a leading dimension of `num_envs`. `done` and `truncated` hold
/// zeros and ones.
#[derive(Clone, Debug)]
pub struct Transition {
    /// The step ended the episode with a zero discount.
    pub done: Tensor,

    /// The step ended the episode with a nonzero discount.
    pub truncated: Tensor,

    /// Actions taken.
    pub action: Tensor,

    /// Critic estimates at the time of acting.
    pub value: Tensor,

    /// Rewards.
    pub reward: Tensor,

    /// Log probabilities of the actions under the acting policy.
    pub log_prob: Tensor,

    /// Observations the actions were taken at.
    pub obs: Tensor,

    /// Observations reached by the step.
    pub next_obs: Tensor,

    /// Episode metrics reported by the environments.
    pub info: Vec<EpisodeMetrics>,
}

/// A rollout of `rollout_length` [`Transition`]s flattened into one batch dimension.
///
/// Row `t * num_envs + e` is the step of environment `e` at time `t`. The same
/// type is used for minibatches gathered from a rollout.
#[derive(Clone, Debug)]
pub struct TrajectoryBatch {
    /// See [`Transition::done`].
    pub done: Tensor,

    /// See [`Transition::truncated`].
    pub truncated: Tensor,

    /// See [`Transition::action`].
    pub action: Tensor,

    /// See [`Transition::value`].
    pub value: Tensor,

    /// See [`Transition::reward`].
    pub reward: Tensor,

    /// See [`Transition::log_prob`].
    pub log_prob: Tensor,

    /// See [`Transition::obs`].
    pub obs: Tensor,

    /// See [`Transition::next_obs`].
    pub next_obs: Tensor,

    /// See [`Transition::info`].
    pub info: Vec<EpisodeMetrics>,
}

impl TrajectoryBatch {
    /// Concatenates transitions in time order.
    pub fn from_transitions(transitions: Vec<Transition>) -> Result<Self> {
        ensure!(!transitions.is_empty(), "A rollout needs at least one transition");
        let cat = |f: fn(&Transition) -> &Tensor| -> Result<Tensor> {
            let ts: Vec<&Tensor> = transitions.iter().map(f).collect();
            Ok(Tensor::cat(&ts, 0)?)
        };
        Ok(Self {
            done: cat(|t| &t.done)?,
            truncated: cat(|t| &t.truncated)?,
            action: cat(|t| &t.action)?,
            value: cat(|t| &t.value)?,
            reward: cat(|t| &t.reward)?,
            log_prob: cat(|t| &t.log_prob)?,
            obs: cat(|t| &t.obs)?,
            next_obs: cat(|t| &t.next_obs)?,
            info: transitions.iter().flat_map(|t| t.info.iter().copied()).collect(),
        })
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.info.len()
    }

    /// `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Gathers the rows at `indices` from every field.
    pub fn sample(&self, indices: &[u32]) -> Result<Self> {
        let idx = Tensor::new(indices, self.obs.device())?;
        let gather = |t: &Tensor| t.index_select(&idx, 0);
        Ok(Self {
            done: gather(&self.done)?,
            truncated: gather(&self.truncated)?,
            action: gather(&self.action)?,
            value: gather(&self.value)?,
            reward: gather(&self.reward)?,
            log_prob: gather(&self.log_prob)?,
            obs: gather(&self.obs)?,
            next_obs: gather(&self.next_obs)?,
            info: indices.iter().map(|&i| self.info[i as usize]).collect(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};

    fn transition(t: f32, num_envs: usize) -> Result<Transition> {
        let d = &Device::Cpu;
        let col = |v: f32| Tensor::full(v, (num_envs,), d);
        Ok(Transition {
            done: Tensor::zeros((num_envs,), DType::F32, d)?,
            truncated: Tensor::zeros((num_envs,), DType::F32, d)?,
            action: Tensor::full(t, (num_envs, 2), d)?,
            value: col(t)?,
            reward: col(t)?,
            log_prob: col(t)?,
            obs: Tensor::full(t, (num_envs, 3), d)?,
            next_obs: Tensor::full(t + 1.0, (num_envs, 3), d)?,
            info: vec![EpisodeMetrics::default(); num_envs],
        })
    }

    #[test]
    fn test_flatten_is_time_major() -> Result<()> {
        let batch = TrajectoryBatch::from_transitions(vec![transition(0.0, 4)?, transition(1.0, 4)?])?;
        assert_eq!(batch.len(), 8);
        assert_eq!(batch.obs.dims(), &[8, 3]);
        assert_eq!(
            batch.reward.to_vec1::<f32>()?,
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]
        );
        Ok(())
    }

    #[test]
    fn test_sample_gathers_rows() -> Result<()> {
        let batch = TrajectoryBatch::from_transitions(vec![transition(0.0, 2)?, transition(5.0, 2)?])?;
        let mb = batch.sample(&[3, 3, 0])?;
        assert_eq!(mb.len(), 3);
        assert_eq!(mb.reward.to_vec1::<f32>()?, vec![5.0, 5.0, 0.0]);
        assert_eq!(mb.next_obs.dims(), &[3, 3]);
        assert_eq!(mb.action.to_vec2::<f32>()?[2], vec![0.0, 0.0]);
        Ok(())
    }
}
