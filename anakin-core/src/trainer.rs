//! Experiment orchestration.
mod config;
use crate::{
    episode::final_step_metrics,
    evaluator::Evaluator,
    record::{LogEvent, Record, RecordValue},
    Checkpointer, Learner, PrngKey, Recorder,
};
use anyhow::Result;
pub use config::{TrainSchedule, TrainerConfig};
use log::info;
use std::{collections::BTreeMap, time::Instant};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Drives a [`Learner`] through training, interleaved with evaluation and checkpointing.
///
/// # Training loop
///
/// For each of the `num_evaluation` evaluation intervals:
///
/// 1. Call [`Learner::learn`], which runs `num_updates_per_eval` update steps.
/// 2. Log the global timestep (`Misc`).
/// 3. If at least one episode completed during the interval, log the returns and
///    lengths of the completed episodes with the environment steps per second (`Act`).
///    Otherwise nothing is logged for this category.
/// 4. Log the per-minibatch train metrics, averaged over the interval, with the
///    optimizer steps per second (`Train`).
/// 5. Evaluate the policy parameters of the new learner state (`Eval`).
/// 6. If enabled, checkpoint the learner state together with the mean evaluation return.
/// 7. If the absolute metric is enabled and the mean evaluation return is the best so
///    far, keep a copy of the policy parameters.
///
/// Finally, the best policy is evaluated again with more episodes (`Absolute`).
///
/// ```mermaid
/// graph LR
///     T[Trainer]-->|LearnerState|L[Learner]
///     L -->|LearnerOutput|T
///     T -->|Params|E[Evaluator]
///     E -->|EvalOutput|T
///     T -->|LearnerState|C[Checkpointer]
///     T -->|Record, LogEvent|R[Recorder]
/// ```
pub struct Trainer {
    config: TrainerConfig,
    schedule: TrainSchedule,
    opt_steps_per_update: usize,
}

/// Averages per-minibatch train metrics over update steps.
fn summarize_train_metrics(records: &[Record]) -> Record {
    let mut values: BTreeMap<String, Vec<f32>> = BTreeMap::new();
    for record in records.iter() {
        for (k, v) in record.iter() {
            match v {
                RecordValue::Array1(xs) => values.entry(k.clone()).or_default().extend(xs),
                RecordValue::Scalar(x) => values.entry(k.clone()).or_default().push(*x),
                _ => {}
            }
        }
    }
    let record = Record::from_slice(
        &values
            .into_iter()
            .map(|(k, xs)| (k, RecordValue::Array1(xs)))
            .collect::<Vec<_>>(),
    );
    record.mean_of_arrays()
}

impl Trainer {
    /// Validates the configuration and builds the trainer.
    ///
    /// `steps_per_update` is the number of environment steps of one update step over
    /// all replicas and `opt_steps_per_update` the number of optimizer steps in it.
    pub fn build(
        config: TrainerConfig,
        steps_per_update: usize,
        opt_steps_per_update: usize,
    ) -> Result<Self> {
        let schedule = config.validate(steps_per_update)?;
        info!(
            "{} updates, {} per evaluation, {} environment steps in total",
            schedule.num_updates, schedule.num_updates_per_eval, schedule.total_timesteps
        );
        Ok(Self {
            config,
            schedule,
            opt_steps_per_update,
        })
    }

    /// The derived update schedule.
    pub fn schedule(&self) -> &TrainSchedule {
        &self.schedule
    }

    /// Runs the experiment and returns the mean return of the final evaluation.
    ///
    /// `key` seeds evaluation episodes only; the learner carries its own keys in its state.
    pub fn train<L, V, C, R>(
        &self,
        learner: &L,
        mut learner_state: L::State,
        evaluator: &mut V,
        mut checkpointer: Option<&mut C>,
        recorder: &mut R,
        key: PrngKey,
    ) -> Result<f32>
    where
        L: Learner,
        V: Evaluator<L::Params>,
        C: Checkpointer<L::State>,
        R: Recorder,
    {
        let mut key = key;
        let mut max_episode_return = f32::NEG_INFINITY;
        let mut best_params = learner.actor_params(&learner_state)?;
        let mut eval_performance = f32::NAN;
        let mut t = 0;
        let mut eval_step = 0;

        for step in 0..self.config.num_evaluation {
            eval_step = step;

            // Train
            let timer = Instant::now();
            let output = learner.learn(learner_state)?;
            let elapsed = timer.elapsed().as_secs_f32();
            t = self.schedule.steps_per_eval * (eval_step + 1);

            recorder.log(
                Record::from_scalar("timestep", t as f32),
                t,
                eval_step,
                LogEvent::Misc,
            );

            let episode_metrics: Vec<_> = output.episode_metrics.into_iter().flatten().collect();
            let (mut act_record, ep_completed) = final_step_metrics(&episode_metrics);
            if ep_completed {
                act_record.insert(
                    "steps_per_second",
                    RecordValue::Scalar(self.schedule.steps_per_eval as f32 / elapsed),
                );
                recorder.log(act_record, t, eval_step, LogEvent::Act);
            }

            let mut train_record = summarize_train_metrics(&output.train_metrics);
            let opt_steps = self.schedule.num_updates_per_eval * self.opt_steps_per_update;
            train_record.insert(
                "steps_per_second",
                RecordValue::Scalar(opt_steps as f32 / elapsed),
            );
            recorder.log(train_record, t, eval_step, LogEvent::Train);

            // Evaluate
            let timer = Instant::now();
            let trained_params = learner.actor_params(&output.learner_state)?;
            let (key_next, eval_key) = key.split();
            key = key_next;
            let eval_output =
                evaluator.evaluate(&trained_params, eval_key, self.config.num_eval_episodes)?;
            let elapsed = timer.elapsed().as_secs_f32();
            let episode_return = eval_output.mean_return();
            eval_performance = episode_return;

            let mut eval_record = eval_output.to_record();
            eval_record.insert(
                "steps_per_second",
                RecordValue::Scalar(eval_output.total_steps() as f32 / elapsed),
            );
            recorder.log(eval_record, t, eval_step, LogEvent::Eval);
            info!(
                "Evaluation {}/{} at timestep {}: mean episode return {}",
                eval_step + 1,
                self.config.num_evaluation,
                t,
                episode_return
            );

            if let Some(checkpointer) = checkpointer.as_deref_mut() {
                checkpointer.save(t, &output.learner_state, episode_return)?;
            }

            if self.config.absolute_metric && max_episode_return <= episode_return {
                best_params = trained_params;
                max_episode_return = episode_return;
            }

            learner_state = output.learner_state;
        }

        if self.config.absolute_metric {
            info!("Starts evaluation of the best policy");
            let timer = Instant::now();
            let (_, eval_key) = key.split();
            let eval_output = evaluator.evaluate(
                &best_params,
                eval_key,
                self.config.num_absolute_metric_episodes,
            )?;
            let elapsed = timer.elapsed().as_secs_f32();
            let mut record = eval_output.to_record();
            record.insert(
                "steps_per_second",
                RecordValue::Scalar(eval_output.total_steps() as f32 / elapsed),
            );
            recorder.log(record, t, eval_step, LogEvent::Absolute);
            eval_performance = eval_output.mean_return();
        }

        recorder.flush();
        Ok(eval_performance)
    }
}
