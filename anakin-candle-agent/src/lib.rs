//! A synchronous, data-parallel PPO learner with a soft Q-function advantage,
//! implemented with [candle](https://crates.io/crates/candle-core).
//!
//! Parameters are plain [`NamedTensors`](util::NamedTensors) trees. Networks are
//! stateless functions of their parameters, and optimizers are pure transforms of
//! gradients and optimizer states. This allows a learner state to be replicated
//! across threads and devices and moved through the update pipeline by value.
pub mod actor;
pub mod critic;
pub mod learner;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod util;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// A GPU device with the given ordinal.
    Cuda(usize),
}

impl Device {
    /// Creates the corresponding [`candle_core::Device`].
    pub fn to_candle(self) -> Result<candle_core::Device> {
        Ok(match self {
            Self::Cpu => candle_core::Device::Cpu,
            Self::Cuda(n) => candle_core::Device::new_cuda(n)?,
        })
    }
}
