use super::{ParameterSet, ReplicatedState};
use crate::util::NamedTensors;
use anakin_core::{Checkpointer, PrngKey};
use anyhow::{anyhow, Result};
use candle_core::Device;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

const PARAMS_FILE: &str = "params.safetensors";
const OPT_STATE_FILE: &str = "opt_state.safetensors";
const METADATA_FILE: &str = "metadata.yaml";

/// Metadata stored next to the tensors of a checkpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CheckpointMetadata {
    /// Global environment step at which the checkpoint was taken.
    pub timestep: usize,

    /// Mean evaluation return at that step.
    pub metric: f32,

    /// Step counters of the actor, critic and Q optimizers.
    pub opt_step_counts: (usize, usize, usize),

    /// Random stream of the first replica.
    pub key: PrngKey,
}

/// Saves the first replica's parameters and optimizer moments as safetensors.
///
/// Each checkpoint lives in `model_dir/{timestep}`.
pub struct SafetensorsCheckpointer {
    model_dir: PathBuf,
    device: Device,
}

impl SafetensorsCheckpointer {
    /// Checkpoints go to `model_dir`; restored tensors are placed on the CPU.
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            device: Device::Cpu,
        }
    }

    /// Device on which restored tensors are placed.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    fn latest(&self) -> Result<PathBuf> {
        let mut latest: Option<usize> = None;
        for entry in fs::read_dir(&self.model_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(t) = entry.file_name().to_str().and_then(|s| s.parse::<usize>().ok()) {
                latest = Some(latest.map_or(t, |l| l.max(t)));
            }
        }
        latest
            .map(|t| self.model_dir.join(t.to_string()))
            .ok_or_else(|| anyhow!("No checkpoint found in {:?}", self.model_dir))
    }

    /// Parameters of the most recent checkpoint.
    pub fn load_params(&self) -> Result<ParameterSet> {
        let dir = self.latest()?;
        let tree = NamedTensors::load(dir.join(PARAMS_FILE), &self.device)?;
        info!("Restored parameters from {:?}", dir);
        ParameterSet::from_named_tensors(&tree)
    }

    /// Metadata of the most recent checkpoint.
    pub fn latest_metadata(&self) -> Result<CheckpointMetadata> {
        let file = File::open(self.latest()?.join(METADATA_FILE))?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }
}

impl<S> Checkpointer<ReplicatedState<S>> for SafetensorsCheckpointer {
    type Params = ParameterSet;

    fn save(&mut self, timestep: usize, state: &ReplicatedState<S>, metric: f32) -> Result<()> {
        let state = state.first()?;
        let dir = self.model_dir.join(timestep.to_string());
        fs::create_dir_all(&dir)?;

        state.params.to_named_tensors().save(dir.join(PARAMS_FILE))?;
        state.opt_states.moments().save(dir.join(OPT_STATE_FILE))?;
        let metadata = CheckpointMetadata {
            timestep,
            metric,
            opt_step_counts: state.opt_states.counts(),
            key: state.key,
        };
        let mut file = File::create(dir.join(METADATA_FILE))?;
        file.write_all(serde_yaml::to_string(&metadata)?.as_bytes())?;

        info!("Saved checkpoint in {:?}", dir);
        Ok(())
    }

    fn restore_params(&self) -> Result<ParameterSet> {
        self.load_params()
    }
}
