//! Keyed containers for linearisation points and tangent-space vectors.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::Key;
use crate::manifold::Manifold;

/// Object-safe view of a stored [`Manifold`] value.
trait StoredValue: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dim(&self) -> usize;
    fn type_name(&self) -> &'static str;
    fn retract_boxed(&self, delta: &DVector<f64>) -> Box<dyn StoredValue>;
    /// `None` when `other` holds a different type.
    fn local_boxed(&self, other: &dyn StoredValue) -> Option<DVector<f64>>;
    fn clone_boxed(&self) -> Box<dyn StoredValue>;
}

impl<V: Manifold> StoredValue for V {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dim(&self) -> usize {
        V::DIM.unwrap_or_else(|| Manifold::dim(self))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<V>()
    }

    fn retract_boxed(&self, delta: &DVector<f64>) -> Box<dyn StoredValue> {
        Box::new(self.retract(delta))
    }

    fn local_boxed(&self, other: &dyn StoredValue) -> Option<DVector<f64>> {
        other.as_any().downcast_ref::<V>().map(|o| self.local(o))
    }

    fn clone_boxed(&self) -> Box<dyn StoredValue> {
        Box::new(self.clone())
    }
}

/// Heterogeneous map from [`Key`] to manifold values.
///
/// Lookups are typed by the caller: `values.at::<Vector2<f64>>(key)`.
#[derive(Debug, Default)]
pub struct Values {
    entries: BTreeMap<Key, Box<dyn StoredValue>>,
}

impl Clone for Values {
    fn clone(&self) -> Self {
        Values {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (*k, v.clone_boxed()))
                .collect(),
        }
    }
}

impl Values {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new value. Fails if `key` is already present.
    pub fn insert<V: Manifold>(&mut self, key: Key, value: V) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.entries.insert(key, Box::new(value));
        Ok(())
    }

    /// Replace an existing value. Fails if `key` is absent.
    pub fn update<V: Manifold>(&mut self, key: Key, value: V) -> Result<()> {
        match self.entries.get_mut(&key) {
            Some(slot) => {
                *slot = Box::new(value);
                Ok(())
            }
            None => Err(Error::MissingKey(key)),
        }
    }

    /// Typed lookup.
    pub fn at<V: Manifold>(&self, key: Key) -> Result<&V> {
        let stored = self.entries.get(&key).ok_or(Error::MissingKey(key))?;
        stored
            .as_any()
            .downcast_ref::<V>()
            .ok_or(Error::TypeMismatch {
                key,
                expected: std::any::type_name::<V>(),
            })
    }

    pub fn exists(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    /// Tangent dimension of the value at `key`.
    pub fn dim(&self, key: Key) -> Result<usize> {
        self.entries
            .get(&key)
            .map(|v| v.dim())
            .ok_or(Error::MissingKey(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    /// Retract every value along its entry in `delta`.
    ///
    /// Keys missing from `delta` are copied unchanged; a delta entry whose
    /// length differs from the value's tangent dimension is an error.
    pub fn retract(&self, delta: &VectorValues) -> Result<Values> {
        let mut entries = BTreeMap::new();
        for (key, value) in &self.entries {
            let moved = match delta.entries.get(key) {
                Some(d) => {
                    if d.len() != value.dim() {
                        return Err(Error::dimension("Values::retract", value.dim(), d.len()));
                    }
                    value.retract_boxed(d)
                }
                None => value.clone_boxed(),
            };
            entries.insert(*key, moved);
        }
        Ok(Values { entries })
    }

    /// Tangent vectors taking every value here to its counterpart in `other`.
    ///
    /// The inverse of [`retract`](Self::retract): `self.retract(&self.local(other)?)`
    /// reproduces `other` on the keys of `self`. Every key of `self` must be
    /// present in `other` with the same value type.
    pub fn local(&self, other: &Values) -> Result<VectorValues> {
        let mut entries = BTreeMap::new();
        for (key, value) in &self.entries {
            let there = other.entries.get(key).ok_or(Error::MissingKey(*key))?;
            let delta = value.local_boxed(there.as_ref()).ok_or(Error::TypeMismatch {
                key: *key,
                expected: value.type_name(),
            })?;
            entries.insert(*key, delta);
        }
        Ok(VectorValues { entries })
    }
}

/// Map from [`Key`] to column vectors: tangent updates, dual variables.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VectorValues {
    entries: BTreeMap<Key, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero vectors matching every tangent dimension in `values`.
    pub fn zero_like(values: &Values) -> Self {
        VectorValues {
            entries: values
                .entries
                .iter()
                .map(|(k, v)| (*k, DVector::zeros(v.dim())))
                .collect(),
        }
    }

    /// Insert or overwrite the vector at `key`, returning the previous one.
    pub fn insert(&mut self, key: Key, value: DVector<f64>) -> Option<DVector<f64>> {
        self.entries.insert(key, value)
    }

    pub fn at(&self, key: Key) -> Result<&DVector<f64>> {
        self.entries.get(&key).ok_or(Error::MissingKey(key))
    }

    pub fn exists(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn dim(&self, key: Key) -> Result<usize> {
        self.at(key).map(|v| v.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &DVector<f64>)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(Key, DVector<f64>)> for VectorValues {
    fn from_iter<I: IntoIterator<Item = (Key, DVector<f64>)>>(iter: I) -> Self {
        VectorValues {
            entries: iter.into_iter().collect(),
        }
    }
}
