use anakin_candle_agent::learner::{
    ActorEvaluator, LearnerConfig, PpoLearner, SafetensorsCheckpointer,
};
use anakin_core::{
    envs::{Pendulum, PendulumConfig, PointMass, PointMassConfig},
    record::{NullRecorder, Recorder},
    Env, EpisodeWrapper, PrngKey, Trainer, TrainerConfig,
};
use anakin_tensorboard::TensorboardRecorder;
use anyhow::Result;
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Environment of an experiment.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
enum EnvConfig {
    Pendulum(PendulumConfig),
    PointMass(PointMassConfig),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
struct ExperimentConfig {
    trainer: TrainerConfig,
    learner: LearnerConfig,
    env: EnvConfig,

    /// Training episodes are truncated after this many steps.
    max_episode_steps: Option<u32>,

    /// Evaluation episodes are cut after this many steps.
    eval_max_steps: u32,

    /// Evaluate at the mode of the policy instead of sampling.
    evaluation_greedy: bool,

    /// Directory of checkpoints and TensorBoard logs.
    model_dir: Option<String>,

    /// Start from the latest checkpoint in `model_dir`.
    load_model: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerConfig::default(),
            learner: LearnerConfig::default(),
            env: EnvConfig::Pendulum(PendulumConfig::default()),
            max_episode_steps: Some(200),
            eval_max_steps: 200,
            evaluation_greedy: false,
            model_dir: None,
            load_model: false,
        }
    }
}

impl ExperimentConfig {
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Train a PPO agent with soft Q advantages
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Experiment configuration in YAML
    #[arg(short, long)]
    config: Option<String>,

    /// Write the configuration to this path and exit
    #[arg(long)]
    dump_config: Option<String>,

    /// Override the seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Start from the latest checkpoint
    #[arg(long, default_value_t = false)]
    load_model: bool,
}

fn create_recorder(model_dir: Option<&str>) -> Box<dyn Recorder> {
    match model_dir {
        Some(dir) => Box::new(TensorboardRecorder::new(dir)),
        None => Box::new(NullRecorder {}),
    }
}

fn run<E: Env + Clone>(env: E, config: &ExperimentConfig) -> Result<f32> {
    let learner_config = config.learner.clone();
    let trainer = Trainer::build(
        config.trainer.clone(),
        learner_config.steps_per_update(),
        learner_config.opt_steps_per_update(),
    )?;

    let train_env = EpisodeWrapper::new(env.clone(), config.max_episode_steps);
    let learner = PpoLearner::build(train_env, learner_config, trainer.schedule())?;
    let device = learner.devices()[0].clone();

    let mut checkpointer = config
        .model_dir
        .as_ref()
        .map(|dir| SafetensorsCheckpointer::new(dir).device(device.clone()));
    let restored = match (&checkpointer, config.load_model) {
        (Some(checkpointer), true) => Some(checkpointer.load_params()?),
        _ => None,
    };

    let (learner_key, eval_key) = PrngKey::new(config.trainer.seed).split();
    let state = learner.init_state(learner_key, restored)?;
    let actor = learner.networks().actor.clone();
    let mut evaluator = ActorEvaluator::new(env, actor, device, config.eval_max_steps)
        .greedy(config.evaluation_greedy);
    let mut recorder = create_recorder(config.model_dir.as_deref());
    let checkpointer = match config.trainer.save_model {
        true => checkpointer.as_mut(),
        false => None,
    };

    trainer.train(
        &learner,
        state,
        &mut evaluator,
        checkpointer,
        &mut recorder,
        eval_key,
    )
}

fn run_experiment(config: &ExperimentConfig) -> Result<f32> {
    match &config.env {
        EnvConfig::Pendulum(c) => run(Pendulum::new(c.clone()), config),
        EnvConfig::PointMass(c) => run(PointMass::new(c.clone()), config),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.trainer.seed = seed;
    }
    config.load_model |= args.load_model;

    if let Some(path) = &args.dump_config {
        config.save(path)?;
        return Ok(());
    }

    let performance = run_experiment(&config)?;
    info!("Final evaluation: mean episode return {}", performance);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn small_config(model_dir: &str) -> ExperimentConfig {
        ExperimentConfig {
            trainer: TrainerConfig::default()
                .num_updates(2)
                .num_evaluation(2)
                .num_eval_episodes(2)
                .num_absolute_metric_episodes(3)
                .save_model(true),
            learner: LearnerConfig::default()
                .num_envs(2)
                .rollout_length(8)
                .epochs(1)
                .critic_minibatches(4, 16)
                .actor_minibatches(2, 16)
                .learning_rates(1e-3, 1e-3, 1e-3)
                .hidden_units(vec![16]),
            env: EnvConfig::PointMass(PointMassConfig::default().episode_length(Some(5))),
            max_episode_steps: None,
            eval_max_steps: 10,
            evaluation_greedy: true,
            model_dir: Some(model_dir.to_string()),
            load_model: false,
        }
    }

    #[test]
    fn test_serde_experiment_config() -> Result<()> {
        let dir = TempDir::new("experiment_config")?;
        let path = dir.path().join("experiment.yaml");
        let config = small_config("model");
        config.save(&path)?;
        assert_eq!(ExperimentConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_train_and_resume() -> Result<()> {
        let dir = TempDir::new("anakin")?;
        let model_dir = dir.path().to_str().unwrap();
        let mut config = small_config(model_dir);
        let performance = run_experiment(&config)?;
        assert!(performance.is_finite());
        // 2 evaluations x 1 update x 16 steps
        assert!(dir.path().join("16").join("params.safetensors").exists());
        assert!(dir.path().join("32").join("metadata.yaml").exists());

        config.load_model = true;
        assert!(run_experiment(&config)?.is_finite());
        Ok(())
    }

    #[test]
    fn test_shipped_config_parses() -> Result<()> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pendulum.yaml");
        let config = ExperimentConfig::load(path)?;
        assert!(matches!(config.env, EnvConfig::Pendulum(_)));
        assert!(config.learner.validate().is_ok());
        Ok(())
    }
}
