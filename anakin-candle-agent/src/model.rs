//! Interface of neural networks used in the learner.
use crate::util::NamedTensors;
use anakin_core::PrngKey;
use anyhow::Result;
use candle_core::Device;

/// Neural network model not owning its parameters.
///
/// The model only describes the computation. Parameters are created by
/// [`SubModel1::init`] and passed to every call of [`SubModel1::forward`], so
/// that the same model can be evaluated with parameters of different replicas
/// or with tracked copies for differentiation.
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`SubModel1::Config`].
    fn build(config: Self::Config) -> Self;

    /// Creates initial parameters from a key.
    fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors>;

    /// A generalized forward function.
    fn forward(&self, params: &NamedTensors, input: &Self::Input) -> Result<Self::Output>;
}

/// Neural network model not owning its parameters.
///
/// The difference from [`SubModel1`] is that this trait takes two inputs.
pub trait SubModel2 {
    /// Configuration from which [`SubModel2`] is constructed.
    type Config;

    /// Input of the [`SubModel2`].
    type Input1;

    /// Input of the [`SubModel2`].
    type Input2;

    /// Output of the [`SubModel2`].
    type Output;

    /// Builds [`SubModel2`].
    fn build(config: Self::Config) -> Self;

    /// Creates initial parameters from a key.
    fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors>;

    /// A generalized forward function.
    fn forward(
        &self,
        params: &NamedTensors,
        input1: &Self::Input1,
        input2: &Self::Input2,
    ) -> Result<Self::Output>;
}
