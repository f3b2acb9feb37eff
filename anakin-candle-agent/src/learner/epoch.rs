use super::{
    advantage::advantages, sample_indices, update_actor, update_critics, GradientReducer,
    LearnerConfig, Networks, OptStates, Optimizers, ParameterSet, TrajectoryBatch,
};
use crate::util::NamedTensors;
use anakin_core::{
    record::{Record, RecordValue},
    PrngKey,
};
use anyhow::Result;
use candle_core::{DType, Tensor};
use log::trace;
use std::collections::BTreeMap;

/// Phases of the epoch loop over one rollout.
#[derive(Debug)]
pub enum EpochPhase {
    /// Critic and Q steps on minibatches drawn from the rollout.
    CriticQ,

    /// Advantages of the whole rollout with the freshly updated critic and Q-function.
    AdvantageRefresh {
        /// Key from which the actor minibatches of this epoch are drawn.
        actor_shuffle_key: PrngKey,
    },

    /// Actor steps on minibatches paired with the refreshed advantages.
    Actor {
        /// Key from which the actor minibatches of this epoch are drawn.
        actor_shuffle_key: PrngKey,

        /// Advantages of the whole rollout.
        advantages: Tensor,
    },

    /// The epoch has finished.
    EpochDone,

    /// All epochs have finished.
    AllEpochsDone,
}

/// Result of [`EpochScheduler::run`].
pub struct EpochOutput {
    /// Parameters after the last epoch.
    pub params: ParameterSet,

    /// Optimizer states after the last epoch.
    pub opt_states: OptStates,

    /// Key to be carried forward.
    pub key: PrngKey,

    /// Per-minibatch loss infos of all epochs, as arrays in step order.
    pub metrics: Record,
}

/// Runs the configured number of epochs over one rollout.
///
/// Each epoch updates critic and Q-function on `num_critic_minibatches`
/// minibatches, recomputes advantages over the whole rollout, then updates the
/// actor on `num_actor_minibatches` minibatches. The rollout itself is never
/// modified, so every epoch samples from the same transitions.
pub struct EpochScheduler<'a> {
    /// Networks.
    pub nets: &'a Networks,

    /// Optimizers.
    pub optimizers: &'a Optimizers,

    /// Configuration.
    pub config: &'a LearnerConfig,

    /// Reduction across replicas.
    pub reducer: &'a dyn GradientReducer,
}

#[derive(Default)]
struct Metrics(BTreeMap<String, Vec<f32>>);

impl Metrics {
    fn push(&mut self, info: &NamedTensors) -> Result<()> {
        for (k, v) in info.iter() {
            let v = v.to_dtype(DType::F32)?.to_scalar::<f32>()?;
            self.0.entry(k.clone()).or_default().push(v);
        }
        Ok(())
    }

    fn push_scalar(&mut self, k: &str, v: f32) {
        self.0.entry(k.to_string()).or_default().push(v);
    }

    fn into_record(self) -> Record {
        let mut record = Record::empty();
        for (k, v) in self.0 {
            record.insert(k, RecordValue::Array1(v));
        }
        record
    }
}

impl<'a> EpochScheduler<'a> {
    /// Runs all epochs and returns the final parameters and optimizer states.
    pub fn run(
        &self,
        params: ParameterSet,
        opt_states: OptStates,
        key: PrngKey,
        batch: &TrajectoryBatch,
    ) -> Result<EpochOutput> {
        let config = self.config;
        let size = batch.len();
        let mut params = params;
        let mut opt_states = opt_states;
        let mut key = key;
        let mut metrics = Metrics::default();
        let mut epoch = 0;
        let mut phase = EpochPhase::CriticQ;

        loop {
            phase = match phase {
                EpochPhase::CriticQ => {
                    let (next_key, shuffle_key) = key.split();
                    key = next_key;
                    let (critic_shuffle_key, actor_shuffle_key) = shuffle_key.split();

                    for mb_key in critic_shuffle_key.split_n(config.num_critic_minibatches) {
                        let idx = sample_indices(mb_key, size, config.critic_minibatch_size);
                        let minibatch = batch.sample(&idx)?;
                        let (next_key, _, critic_loss_key, q_loss_key) = key.split4();
                        key = next_key;
                        let (p, o, info) = update_critics(
                            self.nets,
                            self.optimizers,
                            config,
                            self.reducer,
                            params,
                            opt_states,
                            &minibatch,
                            critic_loss_key,
                            q_loss_key,
                        )?;
                        params = p;
                        opt_states = o;
                        metrics.push(&info)?;
                    }
                    EpochPhase::AdvantageRefresh { actor_shuffle_key }
                }
                EpochPhase::AdvantageRefresh { actor_shuffle_key } => {
                    let (next_key, entropy_key) = key.split();
                    key = next_key;
                    let advantages =
                        advantages(self.nets, &params, batch, config.alpha, entropy_key)?;
                    metrics.push_scalar(
                        "advantage_mean",
                        advantages.mean_all()?.to_dtype(DType::F32)?.to_scalar::<f32>()?,
                    );
                    EpochPhase::Actor {
                        actor_shuffle_key,
                        advantages,
                    }
                }
                EpochPhase::Actor {
                    actor_shuffle_key,
                    advantages,
                } => {
                    for mb_key in actor_shuffle_key.split_n(config.num_actor_minibatches) {
                        let idx = sample_indices(mb_key, size, config.actor_minibatch_size);
                        let minibatch = batch.sample(&idx)?;
                        let idx = Tensor::new(idx.as_slice(), advantages.device())?;
                        let minibatch_advantages = advantages.index_select(&idx, 0)?;
                        let (next_key, actor_loss_key, _, _) = key.split4();
                        key = next_key;
                        let (p, o, info) = update_actor(
                            self.nets,
                            self.optimizers,
                            config,
                            self.reducer,
                            params,
                            opt_states,
                            &minibatch,
                            &minibatch_advantages,
                            actor_loss_key,
                        )?;
                        params = p;
                        opt_states = o;
                        metrics.push(&info)?;
                    }
                    EpochPhase::EpochDone
                }
                EpochPhase::EpochDone => {
                    epoch += 1;
                    trace!("Epoch {}/{} done", epoch, config.epochs);
                    match epoch < config.epochs {
                        true => EpochPhase::CriticQ,
                        false => EpochPhase::AllEpochsDone,
                    }
                }
                EpochPhase::AllEpochsDone => break,
            };
        }

        Ok(EpochOutput {
            params,
            opt_states,
            key,
            metrics: metrics.into_record(),
        })
    }
}
