//! Evaluation of a policy on complete episodes.
use crate::{
    record::{Record, RecordStorage, RecordValue},
    Env, EpisodeMetrics, PrngKey,
};
use anyhow::Result;

/// Metrics of the episodes run by an [`Evaluator`].
#[derive(Debug, Clone, Default)]
pub struct EvalOutput {
    /// Metrics of each completed episode.
    pub episode_metrics: Vec<EpisodeMetrics>,
}

impl EvalOutput {
    /// Mean return over the episodes.
    pub fn mean_return(&self) -> f32 {
        if self.episode_metrics.is_empty() {
            return f32::NAN;
        }
        self.episode_metrics
            .iter()
            .map(|m| m.episode_return)
            .sum::<f32>()
            / self.episode_metrics.len() as f32
    }

    /// Total number of environment steps over the episodes.
    pub fn total_steps(&self) -> usize {
        self.episode_metrics
            .iter()
            .map(|m| m.episode_length as usize)
            .sum()
    }

    /// Summary statistics of episode return and length.
    pub fn to_record(&self) -> Record {
        let mut storage = RecordStorage::new();
        for m in self.episode_metrics.iter() {
            storage.store(Record::from_slice(&[
                ("episode_return", RecordValue::Scalar(m.episode_return)),
                ("episode_length", RecordValue::Scalar(m.episode_length as f32)),
            ]));
        }
        storage.aggregate()
    }
}

/// Evaluates policy parameters of type `P`.
pub trait Evaluator<P> {
    /// Runs `n_episodes` episodes with the given parameters.
    fn evaluate(&mut self, params: &P, key: PrngKey, n_episodes: usize) -> Result<EvalOutput>;
}

/// Runs one episode in each of `n_episodes` environment instances.
///
/// `act` maps a batch of observations to a batch of actions. Only instances whose
/// episode is still running are passed to it. An episode ends on its last step or
/// after `max_steps` steps, whichever comes first.
pub fn run_episodes<E, F>(
    env: &E,
    key: PrngKey,
    n_episodes: usize,
    max_steps: u32,
    mut act: F,
) -> Result<EvalOutput>
where
    E: Env,
    F: FnMut(&[Vec<f32>]) -> Result<Vec<Vec<f32>>>,
{
    let (states, timesteps) = env.reset_batch(&key.split_n(n_episodes))?;
    let mut states: Vec<Option<E::State>> = states.into_iter().map(Some).collect();
    let mut obs: Vec<Vec<f32>> = timesteps.into_iter().map(|ts| ts.observation).collect();
    let mut metrics = vec![EpisodeMetrics::default(); n_episodes];

    loop {
        let active: Vec<usize> = (0..n_episodes).filter(|&i| states[i].is_some()).collect();
        if active.is_empty() {
            break;
        }
        let batch: Vec<Vec<f32>> = active.iter().map(|&i| obs[i].clone()).collect();
        let acts = act(&batch)?;

        for (&i, a) in active.iter().zip(acts.iter()) {
            let state = match states[i].take() {
                Some(state) => state,
                None => continue,
            };
            let (state, ts) = env.step(state, a)?;
            let m = &mut metrics[i];
            m.episode_return += ts.reward;
            m.episode_length += 1;
            if ts.is_last() || m.episode_length >= max_steps {
                m.is_terminal_step = true;
            } else {
                states[i] = Some(state);
                obs[i] = ts.observation;
            }
        }
    }

    Ok(EvalOutput {
        episode_metrics: metrics,
    })
}
