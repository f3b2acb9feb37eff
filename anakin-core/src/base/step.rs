//! Environment time steps.

/// Position of a [`TimeStep`] within an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    /// The first step after a reset.
    First,
    /// Any step that neither starts nor ends an episode.
    Mid,
    /// The final step of an episode, either by termination or truncation.
    Last,
}

/// Running statistics of the episode a [`TimeStep`] belongs to.
///
/// The learner never interprets these values. They are copied verbatim into
/// transitions and handed back to the orchestrator for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpisodeMetrics {
    /// Sum of rewards of the episode so far.
    pub episode_return: f32,

    /// Number of steps of the episode so far.
    pub episode_length: u32,

    /// `true` on the step that ended the episode.
    pub is_terminal_step: bool,
}

/// Auxiliary outputs of an environment step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extras {
    /// Statistics of the current episode.
    pub episode_metrics: EpisodeMetrics,

    /// Observation reached by the step when the environment was reset right after it.
    ///
    /// In that case [`TimeStep::observation`] is the first observation of the new
    /// episode.
    pub final_observation: Option<Vec<f32>>,
}

/// Output of [`Env::reset`](crate::Env::reset) and [`Env::step`](crate::Env::step).
///
/// A zero `discount` signals that the episode terminated. A step of type
/// [`StepType::Last`] with a nonzero discount is a truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    /// Position in the episode.
    pub step_type: StepType,

    /// Observation to act on.
    pub observation: Vec<f32>,

    /// Reward of the transition leading to this step.
    pub reward: f32,

    /// Discount of the transition leading to this step.
    pub discount: f32,

    /// Auxiliary outputs.
    pub extras: Extras,
}

impl TimeStep {
    /// Time step returned by a reset.
    pub fn restart(observation: Vec<f32>) -> Self {
        Self {
            step_type: StepType::First,
            observation,
            reward: 0.0,
            discount: 1.0,
            extras: Extras::default(),
        }
    }

    /// Time step in the middle of an episode.
    pub fn transition(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Mid,
            observation,
            reward,
            discount: 1.0,
            extras: Extras::default(),
        }
    }

    /// Time step ending an episode by reaching a terminal state.
    pub fn termination(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Last,
            observation,
            reward,
            discount: 0.0,
            extras: Extras::default(),
        }
    }

    /// Time step ending an episode without reaching a terminal state.
    pub fn truncation(observation: Vec<f32>, reward: f32) -> Self {
        Self {
            step_type: StepType::Last,
            observation,
            reward,
            discount: 1.0,
            extras: Extras::default(),
        }
    }

    /// `true` for the first step of an episode.
    pub fn is_first(&self) -> bool {
        self.step_type == StepType::First
    }

    /// `true` for the last step of an episode.
    pub fn is_last(&self) -> bool {
        self.step_type == StepType::Last
    }

    /// `true` if the episode ended in a terminal state.
    pub fn is_terminated(&self) -> bool {
        self.discount == 0.0
    }

    /// `true` if the episode ended without reaching a terminal state.
    pub fn is_truncated(&self) -> bool {
        self.is_last() && self.discount != 0.0
    }

    /// Observation reached by the step, before any automatic reset.
    pub fn next_observation(&self) -> &[f32] {
        self.extras
            .final_observation
            .as_deref()
            .unwrap_or(&self.observation)
    }
}
