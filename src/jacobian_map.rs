//! Write-accumulating Jacobian sink for reverse passes.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DMatrixView, Dim, Matrix, RawStorage};

use crate::error::{Error, Result};
use crate::key::Key;

/// Accumulates `∂F/∂xₖ` blocks for every tracked key `k`.
///
/// All blocks share the row count of the differentiated output `F`; the
/// block for key `k` has as many columns as `k`'s tangent dimension. Blocks
/// are laid out side by side in key-insertion order.
#[derive(Clone, Debug)]
pub struct JacobianMap {
    slots: BTreeMap<Key, (usize, usize)>,
    order: Vec<Key>,
    matrix: DMatrix<f64>,
}

impl JacobianMap {
    /// Zeroed map with `rows` output rows and one slot per `(key, dim)`.
    ///
    /// A key listed twice keeps its first slot.
    pub fn new(rows: usize, dims: impl IntoIterator<Item = (Key, usize)>) -> Self {
        let mut slots = BTreeMap::new();
        let mut order = Vec::new();
        let mut cols = 0;
        for (key, dim) in dims {
            if slots.contains_key(&key) {
                continue;
            }
            slots.insert(key, (cols, dim));
            order.push(key);
            cols += dim;
        }
        JacobianMap {
            slots,
            order,
            matrix: DMatrix::zeros(rows, cols),
        }
    }

    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Keys in column order.
    pub fn keys(&self) -> &[Key] {
        &self.order
    }

    pub fn contains(&self, key: Key) -> bool {
        self.slots.contains_key(&key)
    }

    /// Add `block` into the slot of `key`.
    ///
    /// The block must be `rows() × dim(key)`. On error the map is unchanged.
    pub fn add<R, C, S>(&mut self, key: Key, block: &Matrix<f64, R, C, S>) -> Result<()>
    where
        R: Dim,
        C: Dim,
        S: RawStorage<f64, R, C>,
    {
        let &(offset, dim) = self.slots.get(&key).ok_or(Error::UnknownJacobianKey(key))?;
        if block.nrows() != self.matrix.nrows() {
            return Err(Error::dimension(
                "JacobianMap block rows",
                self.matrix.nrows(),
                block.nrows(),
            ));
        }
        if block.ncols() != dim {
            return Err(Error::dimension("JacobianMap block cols", dim, block.ncols()));
        }
        for c in 0..dim {
            for r in 0..block.nrows() {
                self.matrix[(r, offset + c)] += block[(r, c)];
            }
        }
        Ok(())
    }

    /// Run `f` against the map, restoring every block if it fails.
    ///
    /// Records with more than one child wrap their pass in this so an error
    /// from a later child does not keep what an earlier child wrote.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.matrix.clone();
        let result = f(self);
        if result.is_err() {
            self.matrix = saved;
        }
        result
    }

    /// Accumulated block for `key`.
    pub fn block(&self, key: Key) -> Result<DMatrixView<'_, f64>> {
        let &(offset, dim) = self.slots.get(&key).ok_or(Error::UnknownJacobianKey(key))?;
        Ok(self.matrix.view((0, offset), (self.matrix.nrows(), dim)))
    }

    /// All blocks side by side, in [`keys`](Self::keys) order.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.matrix
    }
}
