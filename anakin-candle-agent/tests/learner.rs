use anakin_candle_agent::{
    learner::{
        advantages, collect, EpochScheduler, LearnerConfig, LocalReducer, Networks, Optimizers,
        PpoLearner, ReplicatedState, SafetensorsCheckpointer, TrajectoryBatch,
    },
    Device,
};
use anakin_core::{
    envs::{PointMass, PointMassConfig, PointMassState},
    final_step_metrics, Checkpointer, EpisodeState, EpisodeWrapper, Learner, LearnerOutput,
    PrngKey, TrainSchedule, TrainerConfig,
};
use anyhow::Result;
use candle_core::Tensor;
use tempdir::TempDir;
use test_log::test;

type Env = EpisodeWrapper<PointMass>;
type State = ReplicatedState<EpisodeState<PointMassState>>;

fn env(episode_length: Option<u32>) -> Env {
    let config = PointMassConfig::default().dim(2).episode_length(episode_length);
    EpisodeWrapper::new(PointMass::new(config), None)
}

fn wrapped(episode_length: Option<u32>, max_episode_steps: Option<u32>) -> Env {
    let config = PointMassConfig::default().dim(2).episode_length(episode_length);
    EpisodeWrapper::new(PointMass::new(config), max_episode_steps)
}

fn schedule(config: &LearnerConfig) -> TrainSchedule {
    TrainerConfig::default()
        .num_updates(1)
        .num_evaluation(1)
        .validate(config.steps_per_update())
        .unwrap()
}

/// horizon 16, 4 environments, 2 epochs, 128 critic and 32 actor minibatches of 512.
fn full_config() -> LearnerConfig {
    LearnerConfig::default()
        .num_envs(4)
        .rollout_length(16)
        .epochs(2)
        .critic_minibatches(128, 512)
        .actor_minibatches(32, 512)
        .hidden_units(vec![16])
}

fn small_config() -> LearnerConfig {
    LearnerConfig::default()
        .num_envs(4)
        .rollout_length(16)
        .epochs(2)
        .critic_minibatches(8, 64)
        .actor_minibatches(4, 64)
        .hidden_units(vec![16])
}

fn learn_once(
    env: Env,
    config: LearnerConfig,
    seed: u64,
) -> Result<(PpoLearner<Env>, LearnerOutput<State>)> {
    let schedule = schedule(&config);
    let learner = PpoLearner::build(env, config, &schedule)?;
    let state = learner.init_state(PrngKey::new(seed), None)?;
    let output = learner.learn(state)?;
    Ok((learner, output))
}

#[test]
fn test_optimizer_step_counts_of_one_update() -> Result<()> {
    let (_, output) = learn_once(env(Some(10)), full_config(), 0)?;
    let state = output.learner_state.first()?;
    assert_eq!(state.opt_states.counts(), (64, 256, 256));

    let train = &output.train_metrics[0];
    assert_eq!(train.get_array1("value_loss")?.len(), 256);
    assert_eq!(train.get_array1("q_loss")?.len(), 256);
    assert_eq!(train.get_array1("actor_loss")?.len(), 64);
    assert_eq!(train.get_array1("advantage_mean")?.len(), 2);
    Ok(())
}

#[test]
fn test_update_step_is_reproducible() -> Result<()> {
    let (_, out1) = learn_once(env(Some(10)), small_config(), 7)?;
    let (_, out2) = learn_once(env(Some(10)), small_config(), 7)?;
    let (s1, s2) = (out1.learner_state.first()?, out2.learner_state.first()?);
    assert_eq!(s1.params.max_abs_diff(&s2.params)?, 0.0);
    assert_eq!(s1.key, s2.key);
    assert_eq!(out1.episode_metrics, out2.episode_metrics);

    let (_, out3) = learn_once(env(Some(10)), small_config(), 8)?;
    assert!(s1.params.max_abs_diff(&out3.learner_state.first()?.params)? > 0.0);
    Ok(())
}

#[test]
fn test_episode_metrics_of_completed_episodes() -> Result<()> {
    // Each environment terminates once within the 16 steps of the rollout.
    let (_, output) = learn_once(env(Some(10)), small_config(), 0)?;
    assert_eq!(output.episode_metrics.len(), 1);
    assert_eq!(output.episode_metrics[0].len(), 16 * 4);

    let (record, ep_completed) = final_step_metrics(&output.episode_metrics[0]);
    assert!(ep_completed);
    assert_eq!(
        output.episode_metrics[0]
            .iter()
            .filter(|m| m.is_terminal_step)
            .count(),
        4
    );
    assert_eq!(record.get_scalar("episode_length_min")?, 10.0);
    assert_eq!(record.get_scalar("episode_length_max")?, 10.0);
    Ok(())
}

#[test]
fn test_no_completed_episode_without_termination() -> Result<()> {
    let (_, output) = learn_once(env(None), small_config(), 0)?;
    let (record, ep_completed) = final_step_metrics(&output.episode_metrics[0]);
    assert!(!ep_completed);
    assert!(record.is_empty());
    Ok(())
}

#[test]
fn test_replicas_agree_after_update() -> Result<()> {
    let config = small_config()
        .devices(vec![Device::Cpu, Device::Cpu])
        .update_batch_size(2);
    let (_, output) = learn_once(env(Some(10)), config, 3)?;
    let state = &output.learner_state;
    assert_eq!(state.len(), 4);
    assert_eq!(output.episode_metrics[0].len(), 4 * 16 * 4);

    let first = state.first()?;
    for replica in state.iter().skip(1) {
        assert_eq!(first.params.max_abs_diff(&replica.params)?, 0.0);
        assert_eq!(first.opt_states.counts(), replica.opt_states.counts());
        assert_ne!(first.key, replica.key);
    }
    Ok(())
}

#[test]
fn test_advantage_refresh_follows_critic_update() -> Result<()> {
    let config = small_config().epochs(1);
    let env = env(Some(10));
    let schedule = schedule(&config);
    let learner = PpoLearner::build(env.clone(), config.clone(), &schedule)?;
    let state = learner.init_state(PrngKey::new(0), None)?;
    let state = state.first()?.clone();
    let nets: &Networks = learner.networks();

    let (state, batch) = collect(&env, nets, &candle_core::Device::Cpu, 16, state)?;
    let key = PrngKey::new(123);
    let before = advantages(nets, &state.params, &batch, config.alpha, key)?;

    let optimizers = Optimizers::build(&config, &schedule);
    let scheduler = EpochScheduler {
        nets,
        optimizers: &optimizers,
        config: &config,
        reducer: &LocalReducer,
    };
    let output = scheduler.run(state.params.clone(), state.opt_states, state.key, &batch)?;
    let after = advantages(nets, &output.params, &batch, config.alpha, key)?;

    let diff = (before - after)?.abs()?.sum_all()?.to_scalar::<f32>()?;
    assert!(diff > 0.0);
    Ok(())
}

#[test]
fn test_checkpoint_restores_parameters() -> Result<()> {
    let dir = TempDir::new("checkpoint")?;
    let (learner, output) = learn_once(env(Some(10)), small_config(), 0)?;
    let mut checkpointer = SafetensorsCheckpointer::new(dir.path());
    checkpointer.save(1024, &output.learner_state, -1.5)?;
    checkpointer.save(64, &output.learner_state, -3.0)?;

    let metadata = checkpointer.latest_metadata()?;
    assert_eq!(metadata.timestep, 1024);
    assert_eq!(metadata.metric, -1.5);
    assert_eq!(metadata.opt_step_counts, (8, 16, 16));

    let restored = Checkpointer::<State>::restore_params(&checkpointer)?;
    let saved = &output.learner_state.first()?.params;
    assert_eq!(saved.max_abs_diff(&restored)?, 0.0);

    // a restored learner starts from the saved parameters
    let state = learner.init_state(PrngKey::new(1), Some(restored))?;
    assert_eq!(state.first()?.params.max_abs_diff(saved)?, 0.0);
    assert_eq!(state.first()?.opt_states.counts(), (0, 0, 0));
    Ok(())
}

const HORIZON: usize = 8;
const NUM_ENVS: usize = 2;

/// One rollout of 2 environments over 8 steps.
fn rollout(env: Env) -> Result<TrajectoryBatch> {
    let config = small_config().num_envs(NUM_ENVS).rollout_length(HORIZON);
    let schedule = schedule(&config);
    let learner = PpoLearner::build(env.clone(), config, &schedule)?;
    let state = learner.init_state(PrngKey::new(5), None)?.first()?.clone();
    let device = candle_core::Device::Cpu;
    let (_, batch) = collect(&env, learner.networks(), &device, HORIZON, state)?;
    Ok(batch)
}

/// Flags indexed by time step, then environment.
fn flags(t: &Tensor) -> Result<Vec<Vec<f32>>> {
    Ok(t.reshape((HORIZON, NUM_ENVS))?.to_vec2::<f32>()?)
}

/// Checks that `next_obs` is the observation reached by each step.
///
/// A point mass moves by `0.1 * action`. On the last step of an episode the
/// observation of the following row is the reset one, which must differ.
fn assert_next_obs(batch: &TrajectoryBatch, last_steps: &[usize]) -> Result<()> {
    let obs = batch.obs.to_vec2::<f32>()?;
    let next_obs = batch.next_obs.to_vec2::<f32>()?;
    let action = batch.action.to_vec2::<f32>()?;

    for t in 0..HORIZON {
        for e in 0..NUM_ENVS {
            let row = t * NUM_ENVS + e;
            for d in 0..2 {
                let reached = obs[row][d] + 0.1 * action[row][d];
                assert!((next_obs[row][d] - reached).abs() < 1e-5);
            }
            if t + 1 < HORIZON {
                let following = &obs[row + NUM_ENVS];
                match last_steps.contains(&t) {
                    true => assert_ne!(&next_obs[row], following),
                    false => assert_eq!(&next_obs[row], following),
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_collect_flags_terminations() -> Result<()> {
    // Episodes terminate after 3 steps, before the truncation limit of 5.
    let batch = rollout(wrapped(Some(3), Some(5)))?;
    let expected: Vec<Vec<f32>> = (0..HORIZON)
        .map(|t| match t {
            2 | 5 => vec![1.0; NUM_ENVS],
            _ => vec![0.0; NUM_ENVS],
        })
        .collect();
    assert_eq!(flags(&batch.done)?, expected);
    assert_eq!(flags(&batch.truncated)?, vec![vec![0.0; NUM_ENVS]; HORIZON]);
    assert_next_obs(&batch, &[2, 5])
}

#[test]
fn test_collect_flags_truncations() -> Result<()> {
    // The environment never terminates; the wrapper truncates after 3 steps.
    let batch = rollout(wrapped(None, Some(3)))?;
    let expected: Vec<Vec<f32>> = (0..HORIZON)
        .map(|t| match t {
            2 | 5 => vec![1.0; NUM_ENVS],
            _ => vec![0.0; NUM_ENVS],
        })
        .collect();
    assert_eq!(flags(&batch.truncated)?, expected);
    assert_eq!(flags(&batch.done)?, vec![vec![0.0; NUM_ENVS]; HORIZON]);
    assert_next_obs(&batch, &[2, 5])
}
