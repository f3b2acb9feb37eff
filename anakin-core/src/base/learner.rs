//! Learner and checkpoint interfaces used by the orchestrator.
use super::EpisodeMetrics;
use crate::record::Record;
use anyhow::Result;

/// Output of one [`Learner::learn`] call.
pub struct LearnerOutput<S> {
    /// Learner state after the last update step.
    pub learner_state: S,

    /// Episode metrics of every environment step, one entry per update step.
    pub episode_metrics: Vec<Vec<EpisodeMetrics>>,

    /// Train metrics, one record per update step.
    ///
    /// Each record maps a metric name to a [`RecordValue::Array1`] of
    /// per-minibatch values.
    ///
    /// [`RecordValue::Array1`]: crate::record::RecordValue::Array1
    pub train_metrics: Vec<Record>,
}

/// A learner that runs a fixed number of update steps per call.
pub trait Learner {
    /// State threaded through consecutive calls.
    type State;

    /// Parameters of the acting policy, used for evaluation.
    type Params: Clone;

    /// Runs the update steps of one evaluation interval.
    ///
    /// Takes ownership of the state and returns the new one.
    fn learn(&self, state: Self::State) -> Result<LearnerOutput<Self::State>>;

    /// Returns the policy parameters of the given state.
    ///
    /// Fails if the state holds no policy parameters.
    fn actor_params(&self, state: &Self::State) -> Result<Self::Params>;

    /// Number of agreed-upon optimizer steps taken in one update step.
    fn opt_steps_per_update(&self) -> usize;
}

/// Persists learner states.
pub trait Checkpointer<S> {
    /// Parameters restored from a checkpoint.
    type Params;

    /// Saves a learner state reached at `timestep` together with its evaluation metric.
    fn save(&mut self, timestep: usize, learner_state: &S, metric: f32) -> Result<()>;

    /// Restores the parameters of the most recent checkpoint.
    fn restore_params(&self) -> Result<Self::Params>;
}
