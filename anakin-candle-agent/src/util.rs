//! Utilities.
use anakin_core::PrngKey;
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use rand_distr::{Distribution, StandardNormal};
mod named_tensors;
pub use named_tensors::NamedTensors;

/// Stacks rows of equal length into a tensor of shape `(rows.len(), dim)`.
pub fn rows_to_tensor(rows: &[Vec<f32>], dim: usize, device: &Device) -> Result<Tensor> {
    ensure!(
        rows.iter().all(|r| r.len() == dim),
        "every row must have length {}",
        dim
    );
    let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Ok(Tensor::from_vec(data, (rows.len(), dim), device)?)
}

/// A 1-dimensional tensor.
pub fn vec_to_tensor(v: Vec<f32>, device: &Device) -> Result<Tensor> {
    let n = v.len();
    Ok(Tensor::from_vec(v, (n,), device)?)
}

/// Converts flags to a tensor of zeros and ones.
pub fn flags_to_tensor(flags: &[bool], device: &Device) -> Result<Tensor> {
    let v = flags.iter().map(|&f| if f { 1f32 } else { 0f32 }).collect();
    vec_to_tensor(v, device)
}

/// `gamma * (1 - done)`, the discount applied to bootstrapped values.
pub fn gamma_not_done(gamma: f64, done: &Tensor) -> candle_core::Result<Tensor> {
    done.affine(-gamma, gamma)
}

/// `log(1 + exp(x))`, computed without overflow.
pub fn softplus(x: &Tensor) -> candle_core::Result<Tensor> {
    let soft = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    x.relu()? + soft
}

/// Standard normal noise of the given shape drawn from a key.
pub fn standard_normal(key: PrngKey, shape: (usize, usize), device: &Device) -> Result<Tensor> {
    let mut rng = key.rng();
    let data: Vec<f32> = (0..shape.0 * shape.1)
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();
    Ok(Tensor::from_vec(data, shape, device)?)
}
