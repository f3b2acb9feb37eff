use anakin_core::error::AnakinError;
use anyhow::{anyhow, Result};
use candle_core::{backprop::GradStore, Device, Tensor, Var};
use std::{
    collections::{btree_map::Iter, BTreeMap, HashMap},
    path::Path,
};

/// Named tensors, the parameter tree of a network.
///
/// Also used for gradients, optimizer moments and scalar loss infos, so that all
/// of them can go through the same element-wise arithmetic and the same
/// reduction across replicas. Names are kept sorted, which fixes the order in
/// which tensors are visited.
#[derive(Clone, Debug, Default)]
pub struct NamedTensors {
    named_tensors: BTreeMap<String, Tensor>,
}

impl NamedTensors {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor.
    pub fn insert(&mut self, name: impl Into<String>, t: Tensor) {
        self.named_tensors.insert(name.into(), t);
    }

    /// Returns the tensor of the given name.
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.named_tensors
            .get(name)
            .ok_or_else(|| anyhow!("Tensor {} was not found", name))
    }

    /// Iterates over names and tensors in name order.
    pub fn iter(&self) -> Iter<'_, String, Tensor> {
        self.named_tensors.iter()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.named_tensors.len()
    }

    /// `true` if there is no tensor.
    pub fn is_empty(&self) -> bool {
        self.named_tensors.is_empty()
    }

    /// Applies `f` to every tensor.
    pub fn map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Tensor) -> candle_core::Result<Tensor>,
    {
        let mut named_tensors = BTreeMap::new();
        for (k, v) in self.named_tensors.iter() {
            named_tensors.insert(k.clone(), f(v)?);
        }
        Ok(Self { named_tensors })
    }

    /// Applies `f` to every pair of tensors sharing the same name.
    pub fn zip_map<F>(&self, other: &Self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Tensor, &Tensor) -> candle_core::Result<Tensor>,
    {
        self.check_structure(other)
            .map_err(|detail| anyhow!("Tensor trees differ: {}", detail))?;
        let mut named_tensors = BTreeMap::new();
        for ((k, v1), v2) in self.named_tensors.iter().zip(other.named_tensors.values()) {
            named_tensors.insert(k.clone(), f(v1, v2)?);
        }
        Ok(Self { named_tensors })
    }

    /// Zeros with the same names and shapes.
    pub fn zeros_like(&self) -> Result<Self> {
        self.map(|t| t.zeros_like())
    }

    /// Multiplies every tensor by a scalar.
    pub fn scale(&self, s: f64) -> Result<Self> {
        self.map(|t| t * s)
    }

    /// Moves every tensor to a device.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        self.map(|t| t.to_device(device))
    }

    /// Tensors cut from the computation graph.
    pub fn detach(&self) -> Self {
        Self {
            named_tensors: self
                .named_tensors
                .iter()
                .map(|(k, v)| (k.clone(), v.detach()))
                .collect(),
        }
    }

    /// Square root of the sum of squares of all elements of all tensors.
    pub fn global_norm(&self) -> Result<f32> {
        let mut sum = 0f32;
        for t in self.named_tensors.values() {
            sum += t.sqr()?.sum_all()?.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?;
        }
        Ok(sum.sqrt())
    }

    /// Checks that both trees have the same names and shapes.
    pub fn check_structure(&self, other: &Self) -> std::result::Result<(), String> {
        if self.len() != other.len() {
            return Err(format!("{} tensors vs {} tensors", self.len(), other.len()));
        }
        for ((k1, v1), (k2, v2)) in self.named_tensors.iter().zip(other.named_tensors.iter()) {
            if k1 != k2 {
                return Err(format!("name {} vs {}", k1, k2));
            }
            if v1.dims() != v2.dims() {
                return Err(format!("{}: shape {:?} vs {:?}", k1, v1.dims(), v2.dims()));
            }
        }
        Ok(())
    }

    /// Element-wise mean of trees, accumulated in the given order on `device`.
    ///
    /// Fails with [`AnakinError::ReductionShapeMismatch`] if a tree differs in
    /// structure from the first one.
    pub fn mean(trees: &[&Self], device: &Device) -> Result<Self> {
        let first = trees
            .first()
            .ok_or_else(|| anyhow!("Mean of an empty list of tensor trees"))?;
        for (i, tree) in trees.iter().enumerate().skip(1) {
            first
                .check_structure(tree)
                .map_err(|detail| AnakinError::ReductionShapeMismatch { replica: i, detail })?;
        }

        let mut sum = first.to_device(device)?;
        for tree in trees.iter().skip(1) {
            let tree = tree.to_device(device)?;
            sum = sum.zip_map(&tree, |a, b| a + b)?;
        }
        sum.scale(1.0 / trees.len() as f64)
    }

    /// Largest absolute element-wise difference between two trees.
    pub fn max_abs_diff(&self, other: &Self) -> Result<f32> {
        let mut m = 0f32;
        for t in self.zip_map(other, |a, b| (a - b)?.abs())?.named_tensors.values() {
            let t = t.flatten_all()?.to_dtype(candle_core::DType::F32)?;
            m = t.to_vec1::<f32>()?.into_iter().fold(m, f32::max);
        }
        Ok(m)
    }

    /// Copies the tensors into fresh variables so that gradients can be taken
    /// with respect to them.
    pub fn track(&self) -> Result<Self> {
        self.map(|t| Ok(Var::from_tensor(t)?.into_inner()))
    }

    /// Gradients of the tensors of this tree, which must have been created by
    /// [`NamedTensors::track`].
    ///
    /// Tensors the loss does not depend on get zero gradients.
    pub fn grads(&self, grads: &GradStore) -> Result<Self> {
        self.map(|t| match grads.get(t) {
            Some(g) => Ok(g.detach()),
            None => t.zeros_like(),
        })
    }

    /// Adds a prefix to every name.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            named_tensors: self
                .named_tensors
                .iter()
                .map(|(k, v)| (format!("{}{}", prefix, k), v.clone()))
                .collect(),
        }
    }

    /// The subtree of names starting with `prefix`, with the prefix removed.
    pub fn strip_prefix(&self, prefix: &str) -> Self {
        Self {
            named_tensors: self
                .named_tensors
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(prefix).map(|k| (k.to_string(), v.clone())))
                .collect(),
        }
    }

    /// Merges two trees.
    pub fn union(mut self, other: Self) -> Self {
        self.named_tensors.extend(other.named_tensors);
        self
    }

    /// Saves the tensors in safetensors format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let tensors: HashMap<String, Tensor> = self.named_tensors.clone().into_iter().collect();
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    /// Loads tensors saved with [`NamedTensors::save`].
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path, device)?;
        Ok(Self {
            named_tensors: tensors.into_iter().collect(),
        })
    }
}

impl FromIterator<(String, Tensor)> for NamedTensors {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            named_tensors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn tree(a: &[f32], b: f32) -> NamedTensors {
        let mut t = NamedTensors::new();
        t.insert("w", Tensor::new(a, &Device::Cpu).unwrap());
        t.insert("b", Tensor::new(b, &Device::Cpu).unwrap());
        t
    }

    #[test]
    fn test_mean_and_global_norm() -> Result<()> {
        let t1 = tree(&[1.0, 2.0], 3.0);
        let t2 = tree(&[3.0, 4.0], 5.0);
        let mean = NamedTensors::mean(&[&t1, &t2], &Device::Cpu)?;
        assert_eq!(mean.get("w")?.to_vec1::<f32>()?, vec![2.0, 3.0]);
        assert_eq!(mean.get("b")?.to_scalar::<f32>()?, 4.0);
        assert!((t1.global_norm()? - 14f32.sqrt()).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_mean_rejects_shape_mismatch() {
        let t1 = tree(&[1.0, 2.0], 3.0);
        let t2 = tree(&[3.0, 4.0, 5.0], 5.0);
        let err = NamedTensors::mean(&[&t1, &t2], &Device::Cpu).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnakinError>(),
            Some(AnakinError::ReductionShapeMismatch { replica: 1, .. })
        ));
    }

    #[test]
    fn test_grads_of_tracked_tensors() -> Result<()> {
        let params = tree(&[1.0, 2.0], 3.0).track()?;
        // loss = sum(w^2), does not depend on b
        let loss = params.get("w")?.sqr()?.sum_all()?;
        let grads = params.grads(&loss.backward()?)?;
        assert_eq!(grads.get("w")?.to_vec1::<f32>()?, vec![2.0, 4.0]);
        assert_eq!(grads.get("b")?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("named_tensors")?;
        let path = dir.path().join("params.safetensors");
        let t = tree(&[1.0, 2.0], 3.0).prefixed("actor/");
        t.save(&path)?;
        let loaded = NamedTensors::load(&path, &Device::Cpu)?.strip_prefix("actor/");
        assert_eq!(loaded.max_abs_diff(&tree(&[1.0, 2.0], 3.0))?, 0.0);
        Ok(())
    }
}
