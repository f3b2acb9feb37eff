use super::{
    barrier, run_replica, LearnerConfig, LearnerState, Networks, Optimizers, ParameterSet,
    ReplicaContext, ReplicaOutput, ReplicatedState,
};
use crate::util::NamedTensors;
use anakin_core::{
    error::AnakinError, Env, Learner, LearnerOutput, PrngKey, TrainSchedule,
};
use anyhow::{anyhow, ensure, Result};
use candle_core::Device;
use log::info;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// PPO learner whose advantages come from a soft Q-function and a state-value function.
///
/// The learner runs `devices.len() * update_batch_size` replicas of the update
/// step, each in its own thread and on its own environments and random stream.
/// Replicas meet at a reduction barrier after every minibatch gradient, and all of
/// them apply the same averaged gradient, so their parameters never diverge.
///
/// ```mermaid
/// graph TD
///     C[PpoLearner::learn] -->|LearnerState| R1[Replica 0]
///     C -->|LearnerState| R2[Replica n]
///     R1 -->|gradients| H[Hub]
///     R2 -->|gradients| H
///     H -->|mean| R1
///     H -->|mean| R2
///     R1 -->|ReplicaOutput| C
///     R2 -->|ReplicaOutput| C
/// ```
///
/// Within a replica, one update step is
/// collect → epochs of (critic/Q minibatches → advantage refresh → actor minibatches).
pub struct PpoLearner<E> {
    env: E,
    config: LearnerConfig,
    nets: Networks,
    optimizers: Optimizers,
    devices: Vec<Device>,
    num_updates_per_eval: usize,
}

fn is_disconnected(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<AnakinError>(),
        Some(AnakinError::ReplicaDisconnected)
    )
}

/// Outputs of all replicas, or the error that caused the barrier to fail.
///
/// A failing replica or a failing hub releases the other replicas with
/// disconnection errors. The cause is reported in this order: an error raised
/// by a replica itself, the error of the hub, then a disconnection.
fn join_replicas<T>(hub_result: Result<usize>, results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut errors = vec![];
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => errors.push(e),
        }
    }
    if let Some(i) = errors.iter().position(|e| !is_disconnected(e)) {
        return Err(errors.swap_remove(i));
    }
    hub_result?;
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}

impl<E: Env> PpoLearner<E> {
    /// Builds the learner. Fails on an invalid configuration.
    pub fn build(env: E, config: LearnerConfig, schedule: &TrainSchedule) -> Result<Self> {
        config.validate()?;
        let devices = config
            .devices
            .iter()
            .map(|d| d.to_candle())
            .collect::<Result<Vec<_>>>()?;
        let nets = Networks::build(&config, env.obs_dim(), env.action_spec());
        let optimizers = Optimizers::build(&config, schedule);
        info!(
            "{} replicas on {} devices, {} environment steps per update",
            config.num_replicas(),
            devices.len(),
            config.steps_per_update()
        );
        Ok(Self {
            env,
            config,
            nets,
            optimizers,
            devices,
            num_updates_per_eval: schedule.num_updates_per_eval,
        })
    }

    /// Networks.
    pub fn networks(&self) -> &Networks {
        &self.nets
    }

    /// Devices in replica order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Creates the replicated initial state.
    ///
    /// All replicas start from the same parameters, either `restored` or freshly
    /// initialized, and from zero optimizer states. Each replica gets its own
    /// environment keys and its own random stream.
    pub fn init_state(
        &self,
        key: PrngKey,
        restored: Option<ParameterSet>,
    ) -> Result<ReplicatedState<E::State>> {
        let (key, net_key, env_key, _) = key.split4();
        let params = match restored {
            Some(params) => {
                info!("Starts from restored parameters");
                params
            }
            None => self.nets.init(net_key, &self.devices[0])?,
        };

        let batch = self.config.update_batch_size;
        let num_envs = self.config.num_envs;
        let num_replicas = self.devices.len() * batch;
        let env_keys = env_key.split_n(num_replicas * num_envs);
        let step_keys = key.split_n(num_replicas);

        let mut replicas = Vec::with_capacity(self.devices.len());
        for (d, device) in self.devices.iter().enumerate() {
            let params = params.to_device(device)?;
            let mut on_device = Vec::with_capacity(batch);
            for b in 0..batch {
                let slot = d * batch + b;
                let (env_states, timesteps) = self
                    .env
                    .reset_batch(&env_keys[slot * num_envs..(slot + 1) * num_envs])?;
                on_device.push(LearnerState {
                    params: params.clone(),
                    opt_states: self.optimizers.init(&params)?,
                    key: step_keys[slot],
                    env_states,
                    timesteps,
                });
            }
            replicas.push(on_device);
        }
        Ok(ReplicatedState { replicas })
    }
}

impl<E: Env> Learner for PpoLearner<E> {
    type State = ReplicatedState<E::State>;
    type Params = NamedTensors;

    fn learn(&self, state: Self::State) -> Result<LearnerOutput<Self::State>> {
        let batch = self.config.update_batch_size;
        let n_devices = self.devices.len();
        ensure!(
            state.replicas.len() == n_devices && state.replicas.iter().all(|r| r.len() == batch),
            "Learner state is not laid out as {} devices x {} replicas",
            n_devices,
            batch
        );

        let (hub, handles) = barrier(self.devices.clone(), batch);
        let states: Vec<LearnerState<E::State>> = state.replicas.into_iter().flatten().collect();
        let num_updates = self.num_updates_per_eval;

        let (hub_result, results) = std::thread::scope(|s| {
            let workers: Vec<_> = states
                .into_iter()
                .zip(handles)
                .enumerate()
                .map(|(slot, (state, handle))| {
                    let ctx = ReplicaContext {
                        env: &self.env,
                        nets: &self.nets,
                        optimizers: &self.optimizers,
                        config: &self.config,
                        device: &self.devices[slot / batch],
                    };
                    s.spawn(move || run_replica(&ctx, handle, state, num_updates))
                })
                .collect();
            let hub_result = hub.run();
            let results: Vec<Result<ReplicaOutput<E::State>>> = workers
                .into_iter()
                .map(|w| w.join().unwrap_or_else(|_| Err(anyhow!("A replica panicked"))))
                .collect();
            (hub_result, results)
        });

        let outputs = join_replicas(hub_result, results)?;

        let mut episode_metrics = vec![vec![]; num_updates];
        let mut train_metrics = vec![];
        let mut replicas: Vec<Vec<_>> = (0..n_devices).map(|_| Vec::with_capacity(batch)).collect();
        for (slot, output) in outputs.into_iter().enumerate() {
            for (u, metrics) in output.episode_metrics.into_iter().enumerate() {
                episode_metrics[u].extend(metrics);
            }
            if slot == 0 {
                train_metrics = output.train_metrics;
            }
            replicas[slot / batch].push(output.state);
        }

        Ok(LearnerOutput {
            learner_state: ReplicatedState { replicas },
            episode_metrics,
            train_metrics,
        })
    }

    fn actor_params(&self, state: &Self::State) -> Result<NamedTensors> {
        Ok(state.first()?.params.actor.clone())
    }

    fn opt_steps_per_update(&self) -> usize {
        self.config.opt_steps_per_update()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::learner::GradientReducer;
    use anakin_core::{
        envs::{PointMass, PointMassConfig},
        TrainerConfig,
    };
    use candle_core::Tensor;

    fn tree(w: &[f32]) -> NamedTensors {
        let mut t = NamedTensors::new();
        t.insert("w", Tensor::new(w, &Device::Cpu).unwrap());
        t
    }

    #[test]
    fn test_shape_mismatch_at_the_barrier_is_reported() {
        let (hub, handles) = barrier(vec![Device::Cpu], 2);
        let (hub_result, results) = std::thread::scope(|s| {
            let workers: Vec<_> = handles
                .into_iter()
                .map(|h| {
                    s.spawn(move || -> Result<()> {
                        let w = vec![1f32; 2 + h.id()];
                        h.all_reduce_mean(tree(&w))?;
                        Ok(())
                    })
                })
                .collect();
            let hub_result = hub.run();
            let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
            (hub_result, results)
        });

        assert!(results.iter().all(|r| r.as_ref().is_err_and(is_disconnected)));
        let err = join_replicas(hub_result, results).unwrap_err();
        match err.downcast_ref::<AnakinError>() {
            Some(AnakinError::ReductionShapeMismatch { replica, .. }) => assert_eq!(*replica, 1),
            _ => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn test_replica_error_takes_precedence() {
        let results: Vec<Result<()>> = vec![
            Err(AnakinError::ReplicaDisconnected.into()),
            Err(anyhow!("environment failed")),
        ];
        let hub_result = Err(AnakinError::ReplicaDisconnected.into());
        let err = join_replicas(hub_result, results).unwrap_err();
        assert_eq!(err.to_string(), "environment failed");

        let results: Vec<Result<usize>> = vec![Ok(0), Ok(1)];
        assert_eq!(join_replicas(Ok(3), results).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_actor_params_of_empty_state_is_an_error() -> Result<()> {
        let config = LearnerConfig::default()
            .num_envs(1)
            .rollout_length(4)
            .critic_minibatches(1, 4)
            .actor_minibatches(1, 4)
            .hidden_units(vec![8]);
        let schedule = TrainerConfig::default()
            .num_updates(1)
            .num_evaluation(1)
            .validate(config.steps_per_update())?;
        let learner = PpoLearner::build(PointMass::new(PointMassConfig::default()), config, &schedule)?;

        let state = learner.init_state(PrngKey::new(0), None)?;
        assert_eq!(learner.actor_params(&state)?.len(), 4);

        let empty = ReplicatedState { replicas: vec![] };
        assert!(learner.actor_params(&empty).is_err());
        Ok(())
    }
}
