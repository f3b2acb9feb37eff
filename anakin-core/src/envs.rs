//! Reference environments with continuous actions.
mod pendulum;
mod point_mass;
pub use pendulum::{Pendulum, PendulumConfig, PendulumState};
pub use point_mass::{PointMass, PointMassConfig, PointMassState};
