//! Stochastic policy with a tanh-squashed Gaussian head.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel1,
    util::{softplus, standard_normal, NamedTensors},
};
use anakin_core::{ActionSpec, PrngKey};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};

/// Actions are clamped this far inside the bounds before inverting the squashing.
const BOUND_EPSILON: f64 = 1e-3;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Actor`].
pub struct ActorConfig {
    /// Hidden units of the torso.
    pub units: Vec<usize>,

    /// Lower bound of the standard deviation of the Gaussian.
    pub min_scale: f64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            units: vec![256, 256],
            min_scale: 1e-3,
        }
    }
}

impl ActorConfig {
    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }
}

/// A Gaussian in pre-squash space, mapped into `[minimum, maximum]` by
/// `shift + half_range * tanh(u)`.
///
/// Densities and entropies are of the joint distribution over action dimensions,
/// so they have shape `(batch,)`.
pub struct TanhNormal {
    loc: Tensor,
    scale: Tensor,
    shift: f64,
    half_range: f64,
}

impl TanhNormal {
    /// Creates the distribution from per-dimension location and scale of shape `(batch, act_dim)`.
    pub fn new(loc: Tensor, scale: Tensor, minimum: f64, maximum: f64) -> Self {
        Self {
            loc,
            scale,
            shift: (maximum + minimum) / 2.0,
            half_range: (maximum - minimum) / 2.0,
        }
    }

    fn squash(&self, u: &Tensor) -> candle_core::Result<Tensor> {
        u.tanh()?.affine(self.half_range, self.shift)
    }

    /// `log |d squash / du|`, summed over action dimensions.
    ///
    /// Uses `log(1 - tanh(u)^2) = 2 (log 2 - u - softplus(-2u))`.
    fn log_det_jacobian(&self, u: &Tensor) -> candle_core::Result<Tensor> {
        let log_dtanh = (softplus(&u.affine(-2.0, 0.0)?)? + u)?.affine(-2.0, 2.0 * LN_2)?;
        log_dtanh.affine(1.0, self.half_range.ln())?.sum(D::Minus1)
    }

    fn normal_log_prob(&self, u: &Tensor) -> candle_core::Result<Tensor> {
        let z = ((u - &self.loc)? / &self.scale)?;
        let log_p = (z.sqr()?.affine(-0.5, -0.5 * (2.0 * PI).ln())? - self.scale.log()?)?;
        log_p.sum(D::Minus1)
    }

    fn sample_pre_squash(&self, key: PrngKey) -> Result<Tensor> {
        let (n, d) = self.loc.dims2()?;
        let eps = standard_normal(key, (n, d), self.loc.device())?;
        Ok((&self.loc + (&self.scale * eps)?)?)
    }

    /// Draws one action per row.
    pub fn sample(&self, key: PrngKey) -> Result<Tensor> {
        let u = self.sample_pre_squash(key)?;
        Ok(self.squash(&u)?)
    }

    /// The action of the Gaussian's mode pushed through the squashing.
    pub fn mode(&self) -> Result<Tensor> {
        Ok(self.squash(&self.loc)?)
    }

    /// Log density of actions.
    pub fn log_prob(&self, action: &Tensor) -> Result<Tensor> {
        let lo = -1.0 + BOUND_EPSILON;
        let hi = 1.0 - BOUND_EPSILON;
        let y = action
            .affine(1.0 / self.half_range, -self.shift / self.half_range)?
            .clamp(lo, hi)?;
        // atanh(y) = 0.5 * (log(1 + y) - log(1 - y))
        let u = ((y.affine(1.0, 1.0)?.log()? - y.affine(-1.0, 1.0)?.log()?)? * 0.5)?;
        Ok((self.normal_log_prob(&u)? - self.log_det_jacobian(&u)?)?)
    }

    /// Entropy estimate: Gaussian entropy plus the log-Jacobian at one sample.
    pub fn entropy(&self, key: PrngKey) -> Result<Tensor> {
        let base = self
            .scale
            .log()?
            .affine(1.0, 0.5 + 0.5 * (2.0 * PI).ln())?
            .sum(D::Minus1)?;
        let u = self.sample_pre_squash(key)?;
        Ok((base + self.log_det_jacobian(&u)?)?)
    }
}

/// Stochastic policy network.
///
/// An MLP maps observations to `2 * act_dim` outputs, the location and the
/// pre-softplus scale of a [`TanhNormal`].
#[derive(Debug, Clone)]
pub struct Actor {
    mlp: Mlp,
    act_dim: usize,
    min_scale: f64,
    minimum: f64,
    maximum: f64,
}

impl Actor {
    /// Builds the actor for the given observation dimension and action specification.
    pub fn build(config: &ActorConfig, obs_dim: usize, spec: ActionSpec) -> Self {
        let mlp_config = MlpConfig::new(obs_dim, config.units.clone(), 2 * spec.dim, false);
        Self {
            mlp: <Mlp as SubModel1>::build(mlp_config),
            act_dim: spec.dim,
            min_scale: config.min_scale,
            minimum: spec.minimum as f64,
            maximum: spec.maximum as f64,
        }
    }

    /// Creates initial parameters.
    pub fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        SubModel1::init(&self.mlp, key, device)
    }

    /// The action distribution at a batch of observations.
    pub fn forward(&self, params: &NamedTensors, obs: &Tensor) -> Result<TanhNormal> {
        let out = SubModel1::forward(&self.mlp, params, obs)?;
        let loc = out.narrow(D::Minus1, 0, self.act_dim)?;
        let scale = softplus(&out.narrow(D::Minus1, self.act_dim, self.act_dim)?)?
            .affine(1.0, self.min_scale)?;
        Ok(TanhNormal::new(loc, scale, self.minimum, self.maximum))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;

    fn dist(loc: f32, scale: f32, n: usize) -> Result<TanhNormal> {
        let loc = Tensor::full(loc, (n, 1), &Device::Cpu)?;
        let scale = Tensor::full(scale, (n, 1), &Device::Cpu)?;
        Ok(TanhNormal::new(loc, scale, -2.0, 2.0))
    }

    #[test]
    fn test_samples_are_within_bounds() -> Result<()> {
        let d = dist(0.0, 3.0, 256)?;
        let a = d.sample(PrngKey::new(0))?.flatten_all()?.to_vec1::<f32>()?;
        assert!(a.iter().all(|&x| (-2.0..=2.0).contains(&x)));
        Ok(())
    }

    #[test]
    fn test_log_prob_matches_change_of_variables() -> Result<()> {
        // u = 0.3, a = 2 tanh(0.3)
        let d = dist(0.0, 1.0, 1)?;
        let u = 0.3f64;
        let a = Tensor::full((2.0 * u.tanh()) as f32, (1, 1), &Device::Cpu)?;
        let expected = -0.5 * u * u - 0.5 * (2.0 * PI).ln() - (2.0 * (1.0 - u.tanh().powi(2))).ln();
        let log_p = d.log_prob(&a)?.to_vec1::<f32>()?[0] as f64;
        assert!((log_p - expected).abs() < 1e-4, "{} vs {}", log_p, expected);
        Ok(())
    }

    #[test]
    fn test_entropy_is_keyed() -> Result<()> {
        let d = dist(0.5, 0.7, 8)?;
        let (k1, k2) = PrngKey::new(3).split();
        let e1 = d.entropy(k1)?.to_vec1::<f32>()?;
        let e1_ = d.entropy(k1)?.to_vec1::<f32>()?;
        let e2 = d.entropy(k2)?.to_vec1::<f32>()?;
        assert_eq!(e1, e1_);
        assert_ne!(e1, e2);
        Ok(())
    }

    #[test]
    fn test_actor_forward() -> Result<()> {
        let spec = ActionSpec {
            dim: 2,
            minimum: -1.0,
            maximum: 1.0,
        };
        let actor = Actor::build(&ActorConfig::default().units(vec![16]), 3, spec);
        let params = actor.init(PrngKey::new(0), &Device::Cpu)?;
        let obs = Tensor::zeros((4, 3), DType::F32, &Device::Cpu)?;
        let policy = actor.forward(&params, &obs)?;
        let a = policy.sample(PrngKey::new(1))?;
        assert_eq!(a.dims(), &[4, 2]);
        assert_eq!(policy.log_prob(&a)?.dims(), &[4]);
        assert_eq!(policy.mode()?.dims(), &[4, 2]);
        Ok(())
    }
}
