use crate::{ActionSpec, Env, PrngKey, TimeStep};
use anyhow::{ensure, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Configuration of [`Pendulum`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PendulumConfig {
    /// Maximum angular speed.
    pub max_speed: f32,

    /// Maximum torque.
    pub max_torque: f32,

    /// Integration time step.
    pub dt: f32,

    /// Gravitational acceleration.
    pub g: f32,

    /// Mass.
    pub m: f32,

    /// Length.
    pub l: f32,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            max_torque: 2.0,
            dt: 0.05,
            g: 10.0,
            m: 1.0,
            l: 1.0,
        }
    }
}

/// State of [`Pendulum`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendulumState {
    /// Angle, zero is upright.
    pub th: f32,

    /// Angular velocity.
    pub thdot: f32,
}

/// The classic torque-controlled pendulum swing-up task.
///
/// Observations are `[cos(th), sin(th), thdot]`. The task never terminates;
/// wrap it with [`EpisodeWrapper`](crate::EpisodeWrapper) to truncate episodes.
#[derive(Debug, Clone, Default)]
pub struct Pendulum {
    config: PendulumConfig,
}

impl Pendulum {
    /// Creates the environment.
    pub fn new(config: PendulumConfig) -> Self {
        Self { config }
    }

    fn obs(state: &PendulumState) -> Vec<f32> {
        vec![state.th.cos(), state.th.sin(), state.thdot]
    }
}

fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Env for Pendulum {
    type State = PendulumState;

    fn obs_dim(&self) -> usize {
        3
    }

    fn action_spec(&self) -> ActionSpec {
        ActionSpec {
            dim: 1,
            minimum: -self.config.max_torque,
            maximum: self.config.max_torque,
        }
    }

    fn reset(&self, key: PrngKey) -> Result<(Self::State, TimeStep)> {
        let mut rng = key.rng();
        let state = PendulumState {
            th: rng.gen_range(-PI..PI),
            thdot: rng.gen_range(-1.0..1.0),
        };
        let timestep = TimeStep::restart(Self::obs(&state));
        Ok((state, timestep))
    }

    fn step(&self, state: Self::State, act: &[f32]) -> Result<(Self::State, TimeStep)> {
        ensure!(act.len() == 1, "expected a scalar torque, got {:?}", act);
        let c = &self.config;
        let PendulumState { th, thdot } = state;
        let u = act[0].clamp(-c.max_torque, c.max_torque);
        let cost = angle_normalize(th).powi(2) + 0.1 * thdot.powi(2) + 0.001 * u.powi(2);

        let thdot = thdot
            + (3.0 * c.g / (2.0 * c.l) * th.sin() + 3.0 / (c.m * c.l.powi(2)) * u) * c.dt;
        let thdot = thdot.clamp(-c.max_speed, c.max_speed);
        let th = th + thdot * c.dt;

        let state = PendulumState { th, thdot };
        let timestep = TimeStep::transition(Self::obs(&state), -cost);
        Ok((state, timestep))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_upright_at_rest_has_zero_cost() -> Result<()> {
        let env = Pendulum::default();
        let state = PendulumState { th: 0.0, thdot: 0.0 };
        let (state, ts) = env.step(state, &[0.0])?;
        assert_eq!(ts.reward, 0.0);
        assert_eq!(state.thdot, 0.0);
        assert!(!ts.is_last());
        Ok(())
    }

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-0.5) + 0.5).abs() < 1e-6);
    }
}
