//! PPO learner with soft Q-function advantages.
mod advantage;
mod checkpoint;
mod collector;
mod config;
mod coordinator;
mod driver;
mod epoch;
mod evaluator;
pub mod loss;
mod networks;
mod reduce;
mod sampler;
mod state;
mod transition;
mod update;
pub use advantage::advantages;
pub use checkpoint::{CheckpointMetadata, SafetensorsCheckpointer};
pub use collector::collect;
pub use config::LearnerConfig;
pub use coordinator::PpoLearner;
pub use driver::{run_replica, update_step, ReplicaContext, ReplicaOutput, UpdateOutput};
pub use epoch::{EpochOutput, EpochPhase, EpochScheduler};
pub use evaluator::ActorEvaluator;
pub use networks::Networks;
pub use reduce::{barrier, two_stage_mean, GradientReducer, Hub, LocalReducer, ReplicaHandle};
pub use sampler::sample_indices;
pub use state::{LearnerState, OptStates, ParameterSet, ReplicatedState};
pub use transition::{TrajectoryBatch, Transition};
pub use update::{update_actor, update_critics, Optimizers};
