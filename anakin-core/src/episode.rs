//! Episode bookkeeping on top of an [`Env`].
use crate::{
    record::{Record, RecordStorage, RecordValue},
    ActionSpec, Env, EpisodeMetrics, PrngKey, StepType, TimeStep,
};
use anyhow::Result;

/// State of an [`EpisodeWrapper`].
#[derive(Debug, Clone)]
pub struct EpisodeState<S> {
    inner: S,
    key: PrngKey,
    episode_return: f32,
    episode_length: u32,
}

/// Records episode metrics, truncates long episodes and resets automatically.
///
/// On the last step of an episode the returned time step carries the metrics of the
/// finished episode with `is_terminal_step == true`, while its observation is the
/// first observation of the next episode. The observation reached by the step is
/// kept in [`Extras::final_observation`](crate::Extras::final_observation).
#[derive(Debug, Clone)]
pub struct EpisodeWrapper<E> {
    env: E,
    max_episode_steps: Option<u32>,
}

impl<E: Env> EpisodeWrapper<E> {
    /// Wraps an environment. Episodes longer than `max_episode_steps` are truncated.
    pub fn new(env: E, max_episode_steps: Option<u32>) -> Self {
        Self {
            env,
            max_episode_steps,
        }
    }
}

impl<E: Env> Env for EpisodeWrapper<E> {
    type State = EpisodeState<E::State>;

    fn obs_dim(&self) -> usize {
        self.env.obs_dim()
    }

    fn action_spec(&self) -> ActionSpec {
        self.env.action_spec()
    }

    fn reset(&self, key: PrngKey) -> Result<(Self::State, TimeStep)> {
        let (key, reset_key) = key.split();
        let (inner, timestep) = self.env.reset(reset_key)?;
        let state = EpisodeState {
            inner,
            key,
            episode_return: 0.0,
            episode_length: 0,
        };
        Ok((state, timestep))
    }

    fn step(&self, state: Self::State, act: &[f32]) -> Result<(Self::State, TimeStep)> {
        let EpisodeState {
            inner,
            key,
            episode_return,
            episode_length,
        } = state;
        let (inner, mut timestep) = self.env.step(inner, act)?;
        let episode_return = episode_return + timestep.reward;
        let episode_length = episode_length + 1;

        if !timestep.is_last() && self.max_episode_steps.map_or(false, |n| episode_length >= n) {
            timestep.step_type = StepType::Last;
        }

        timestep.extras.episode_metrics = EpisodeMetrics {
            episode_return,
            episode_length,
            is_terminal_step: timestep.is_last(),
        };

        if !timestep.is_last() {
            let state = EpisodeState {
                inner,
                key,
                episode_return,
                episode_length,
            };
            return Ok((state, timestep));
        }

        let (key, reset_key) = key.split();
        let (inner, restart) = self.env.reset(reset_key)?;
        let final_observation = std::mem::replace(&mut timestep.observation, restart.observation);
        timestep.extras.final_observation = Some(final_observation);
        let state = EpisodeState {
            inner,
            key,
            episode_return: 0.0,
            episode_length: 0,
        };
        Ok((state, timestep))
    }
}

/// Extracts the metrics of completed episodes.
///
/// Only entries with `is_terminal_step == true` are kept. The returned flag is
/// `false` when no episode completed, in which case the record is empty.
pub fn final_step_metrics(metrics: &[EpisodeMetrics]) -> (Record, bool) {
    let mut storage = RecordStorage::new();
    for m in metrics.iter().filter(|m| m.is_terminal_step) {
        storage.store(Record::from_slice(&[
            ("episode_return", RecordValue::Scalar(m.episode_return)),
            ("episode_length", RecordValue::Scalar(m.episode_length as f32)),
        ]));
    }

    if storage.is_empty() {
        (Record::empty(), false)
    } else {
        (storage.aggregate(), true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::envs::{PointMass, PointMassConfig};

    #[test]
    fn test_truncation_and_auto_reset() -> Result<()> {
        let env = EpisodeWrapper::new(PointMass::new(PointMassConfig::default()), Some(3));
        let (mut state, _) = env.reset(PrngKey::new(0))?;
        let mut lasts = vec![];
        for _ in 0..7 {
            let (s, ts) = env.step(state, &[0.5])?;
            state = s;
            lasts.push(ts.is_last());
            if ts.is_last() {
                assert!(ts.is_truncated());
                assert_eq!(ts.extras.episode_metrics.episode_length, 3);
                assert!(ts.extras.final_observation.is_some());
            }
        }
        assert_eq!(lasts, vec![false, false, true, false, false, true, false]);
        Ok(())
    }

    #[test]
    fn test_final_step_metrics() {
        let metrics = vec![
            EpisodeMetrics {
                episode_return: 1.0,
                episode_length: 1,
                is_terminal_step: false,
            },
            EpisodeMetrics {
                episode_return: 4.0,
                episode_length: 5,
                is_terminal_step: true,
            },
            EpisodeMetrics {
                episode_return: 2.0,
                episode_length: 3,
                is_terminal_step: true,
            },
        ];
        let (record, completed) = final_step_metrics(&metrics);
        assert!(completed);
        assert_eq!(record.get_scalar("episode_return_mean").unwrap(), 3.0);
        assert_eq!(record.get_scalar("episode_length_max").unwrap(), 5.0);

        let (record, completed) = final_step_metrics(&metrics[..1]);
        assert!(!completed);
        assert!(record.is_empty());
    }
}
