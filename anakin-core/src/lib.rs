#![warn(missing_docs)]
//! Core of a synchronous, data-parallel reinforcement learning library.
//!
//! This crate is independent of any tensor backend. It provides
//!
//! * functional environments ([`Env`]) and their time steps ([`TimeStep`]),
//! * splittable random keys ([`PrngKey`]),
//! * episode bookkeeping with automatic resets ([`EpisodeWrapper`]),
//! * records and recorders for metrics ([`record`]),
//! * the interfaces of learners, evaluators and checkpointers, and
//! * the experiment loop driving them ([`Trainer`]).
pub mod envs;
pub mod error;
pub mod evaluator;
pub mod record;

mod base;
pub use base::{
    ActionSpec, Checkpointer, Env, EpisodeMetrics, Extras, Learner, LearnerOutput, StepType,
    TimeStep,
};

mod episode;
pub use episode::{final_step_metrics, EpisodeState, EpisodeWrapper};

mod key;
pub use key::PrngKey;

mod trainer;
pub use trainer::{TrainSchedule, Trainer, TrainerConfig};

pub use record::Recorder;
