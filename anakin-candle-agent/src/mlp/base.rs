use super::{mlp_forward, MlpConfig};
use crate::{
    model::{SubModel1, SubModel2},
    util::NamedTensors,
};
use anakin_core::PrngKey;
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor, D};
use candle_nn::Linear;
use rand::Rng;

/// Multilayer perceptron with ReLU activation function.
///
/// Parameters are named `ln{i}.weight` and `ln{i}.bias`. Weights have shape
/// `(out_dim, in_dim)`.
#[derive(Debug, Clone)]
pub struct Mlp {
    config: MlpConfig,
}

impl Mlp {
    fn in_out_pairs(&self) -> Vec<(usize, usize)> {
        let c = &self.config;
        let mut dims = vec![c.in_dim];
        dims.extend(c.units.iter().copied());
        dims.push(c.out_dim);
        dims.windows(2).map(|w| (w[0], w[1])).collect()
    }

    fn layers(&self, params: &NamedTensors) -> Result<Vec<Linear>> {
        (0..self.in_out_pairs().len())
            .map(|i| {
                let w = params.get(&format!("ln{}.weight", i))?.clone();
                let b = params.get(&format!("ln{}.bias", i))?.clone();
                Ok(Linear::new(w, Some(b)))
            })
            .collect()
    }

    fn _init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        let pairs = self.in_out_pairs();
        let keys = key.split_n(pairs.len());
        let mut params = NamedTensors::new();

        // Uniform in [-1/sqrt(in_dim), 1/sqrt(in_dim)], as candle_nn::linear
        for (i, (&(in_dim, out_dim), key)) in pairs.iter().zip(keys).enumerate() {
            let bound = 1.0 / (in_dim as f32).sqrt();
            let mut rng = key.rng();
            let mut draw = |n: usize| -> Vec<f32> {
                (0..n).map(|_| rng.gen_range(-bound..bound)).collect()
            };
            let w = Tensor::from_vec(draw(in_dim * out_dim), (out_dim, in_dim), device)?;
            let b = Tensor::from_vec(draw(out_dim), (out_dim,), device)?;
            params.insert(format!("ln{}.weight", i), w);
            params.insert(format!("ln{}.bias", i), b);
        }
        Ok(params)
    }
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(config: Self::Config) -> Self {
        Self { config }
    }

    fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        self._init(key, device)
    }

    fn forward(&self, params: &NamedTensors, xs: &Self::Input) -> Result<Tensor> {
        ensure!(
            xs.dim(D::Minus1)? == self.config.in_dim,
            "expected input of dimension {}, got {:?}",
            self.config.in_dim,
            xs.dims()
        );
        let layers = self.layers(params)?;
        Ok(mlp_forward(xs.clone(), &layers, self.config.activation_out)?)
    }
}

impl SubModel2 for Mlp {
    type Config = MlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(config: Self::Config) -> Self {
        Self { config }
    }

    fn init(&self, key: PrngKey, device: &Device) -> Result<NamedTensors> {
        self._init(key, device)
    }

    fn forward(
        &self,
        params: &NamedTensors,
        input1: &Self::Input1,
        input2: &Self::Input2,
    ) -> Result<Self::Output> {
        let input = Tensor::cat(&[input1, input2], D::Minus1)?;
        SubModel1::forward(self, params, &input)
    }
}
