//! Base implementation of records for logging.
use crate::error::AnakinError;
use chrono::prelude::{DateTime, Local};
use std::collections::{
    btree_map::{Iter, Keys},
    BTreeMap,
};

/// Represents possible types of values that can be stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value, typically a loss or an episode return.
    Scalar(f32),

    /// A timestamp with local timezone.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array, e.g., per-minibatch losses of an update step.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

/// A container of key-value pairs of various data types.
///
/// Keys are kept ordered so that records are written in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(BTreeMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys in the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Removes a key from the record, returning its value.
    pub fn remove(&mut self, k: &str) -> Option<RecordValue> {
        self.0.remove(k)
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records, consuming both.
    ///
    /// Values of `record` overwrite values of `self` sharing the same key.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Gets a scalar value from the record.
    pub fn get_scalar(&self, k: &str) -> Result<f32, AnakinError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(AnakinError::RecordValueTypeError("Scalar".to_string())),
            None => Err(AnakinError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 1-dimensional array from the record.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, AnakinError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(AnakinError::RecordValueTypeError("Array1".to_string())),
            None => Err(AnakinError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a string value from the record.
    pub fn get_string(&self, k: &str) -> Result<String, AnakinError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(AnakinError::RecordValueTypeError("String".to_string())),
            None => Err(AnakinError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns a record where every [`RecordValue::Array1`] is replaced by its mean.
    ///
    /// Empty arrays are dropped. Other values are kept as they are.
    pub fn mean_of_arrays(&self) -> Record {
        Record(
            self.0
                .iter()
                .filter_map(|(k, v)| match v {
                    RecordValue::Array1(xs) if xs.is_empty() => None,
                    RecordValue::Array1(xs) => Some((
                        k.clone(),
                        RecordValue::Scalar(xs.iter().sum::<f32>() / xs.len() as f32),
                    )),
                    v => Some((k.clone(), v.clone())),
                })
                .collect(),
        )
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_with_wrong_type() {
        let record = Record::from_slice(&[
            ("loss", RecordValue::Scalar(0.5)),
            ("name", RecordValue::String("ppo".to_string())),
        ]);
        assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
        assert!(matches!(
            record.get_scalar("name"),
            Err(AnakinError::RecordValueTypeError(_))
        ));
        assert!(matches!(
            record.get_scalar("missing"),
            Err(AnakinError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_mean_of_arrays() {
        let record = Record::from_slice(&[
            ("value_loss", RecordValue::Array1(vec![1.0, 2.0, 3.0])),
            ("empty", RecordValue::Array1(vec![])),
            ("lr", RecordValue::Scalar(0.1)),
        ]);
        let mean = record.mean_of_arrays();
        assert_eq!(mean.get_scalar("value_loss").unwrap(), 2.0);
        assert_eq!(mean.get_scalar("lr").unwrap(), 0.1);
        assert!(mean.get("empty").is_none());
    }

    #[test]
    fn test_merge_overwrites() {
        let a = Record::from_scalar("x", 1.0);
        let b = Record::from_slice(&[
            ("x", RecordValue::Scalar(2.0)),
            ("y", RecordValue::Scalar(3.0)),
        ]);
        let merged = a.merge(b);
        assert_eq!(merged.get_scalar("x").unwrap(), 2.0);
        assert_eq!(merged.len(), 2);
    }
}
