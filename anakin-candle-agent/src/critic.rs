//! State-value and state-action-value networks.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::{SubModel1, SubModel2},
    util::NamedTensors,
};
use anakin_core::PrngKey;
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ValueNet`] and [`QNet`].
pub struct CriticConfig {
    /// Hidden units.
    pub units: Vec<usize>,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            units: vec![256, 256],
        }
    }
}

impl CriticConfig {
    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }
}

/// `V(obs)`, returning a tensor of shape `(batch,)`.
#[derive(Debug, Clone)]
pub struct ValueNet {
    mlp: Mlp,
}

impl ValueNet {
    /// Builds the network for the given observation dimension.
    pub fn build(config: &CriticConfig, obs_dim: usize) -> Self {
        let mlp_config = MlpConfig::new(obs_dim, config.units.clone(), 1, false);
        Self {
            mlp: <Mlp as SubModel1>::build(mlp_config),
        }
    }

    /// Creates initial parameters.
    pub fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        SubModel1::init(&self.mlp, key, device)
    }

    /// Evaluates the value of a batch of observations.
    pub fn forward(&self, params: &NamedTensors, obs: &Tensor) -> Result<Tensor> {
        Ok(SubModel1::forward(&self.mlp, params, obs)?.squeeze(D::Minus1)?)
    }
}

/// `Q(obs, act)`, returning a tensor of shape `(batch,)`.
#[derive(Debug, Clone)]
pub struct QNet {
    mlp: Mlp,
}

impl QNet {
    /// Builds the network; its input is the concatenation of observation and action.
    pub fn build(config: &CriticConfig, obs_dim: usize, act_dim: usize) -> Self {
        let mlp_config = MlpConfig::new(obs_dim + act_dim, config.units.clone(), 1, false);
        Self {
            mlp: <Mlp as SubModel2>::build(mlp_config),
        }
    }

    /// Creates initial parameters.
    pub fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        SubModel2::init(&self.mlp, key, device)
    }

    /// Evaluates action values.
    pub fn forward(&self, params: &NamedTensors, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Ok(SubModel2::forward(&self.mlp, params, obs, act)?.squeeze(D::Minus1)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_output_shapes() -> Result<()> {
        let config = CriticConfig::default().units(vec![8]);
        let v = ValueNet::build(&config, 3);
        let q = QNet::build(&config, 3, 2);
        let (k1, k2) = PrngKey::new(0).split();
        let v_params = v.init(k1, &Device::Cpu)?;
        let q_params = q.init(k2, &Device::Cpu)?;
        let obs = Tensor::ones((5, 3), DType::F32, &Device::Cpu)?;
        let act = Tensor::ones((5, 2), DType::F32, &Device::Cpu)?;
        assert_eq!(v.forward(&v_params, &obs)?.dims(), &[5]);
        assert_eq!(q.forward(&q_params, &obs, &act)?.dims(), &[5]);
        assert_eq!(q_params.get("ln0.weight")?.dims(), &[8, 5]);
        Ok(())
    }
}
