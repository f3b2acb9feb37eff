//! Core interfaces.
mod env;
mod learner;
mod step;
pub use env::{ActionSpec, Env};
pub use learner::{Checkpointer, Learner, LearnerOutput};
pub use step::{EpisodeMetrics, Extras, StepType, TimeStep};
