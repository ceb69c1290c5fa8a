//! Residual factor base: keyed, noise-weighted nonlinear factors of arity 1–3.
//!
//! Implementors provide [`FactorBase`] (keys + noise model) and
//! `evaluate_error`, which returns the unwhitened residual and fills any
//! Jacobian sink it is handed. Residual evaluation, cost and linearisation
//! come for free.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::Key;
use crate::linear::JacobianFactor;
use crate::manifold::Manifold;
use crate::noise::NoiseModel;
use crate::values::Values;

/// State shared by every noise-model factor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactorBase {
    keys: Vec<Key>,
    noise_model: NoiseModel,
}

impl FactorBase {
    pub fn new(noise_model: NoiseModel, keys: Vec<Key>) -> Self {
        FactorBase { keys, noise_model }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn noise_model(&self) -> &NoiseModel {
        &self.noise_model
    }

    /// Residual dimension.
    pub fn dim(&self) -> usize {
        self.noise_model.dim()
    }
}

/// Whiten `error` and its Jacobian blocks into a linear factor.
///
/// Row scaling follows [`NoiseModel::whiten`]; the right-hand side is the
/// negated whitened residual.
fn whitened_system(
    base: &FactorBase,
    error: DVector<f64>,
    blocks: Vec<DMatrix<f64>>,
) -> Result<JacobianFactor> {
    let model = base.noise_model();
    if error.len() != model.dim() {
        return Err(Error::dimension("factor residual", model.dim(), error.len()));
    }
    let mut terms = Vec::with_capacity(blocks.len());
    for (&key, mut a) in base.keys().iter().zip(blocks) {
        if a.nrows() != error.len() {
            return Err(Error::dimension("factor Jacobian rows", error.len(), a.nrows()));
        }
        for (i, mut row) in a.row_iter_mut().enumerate() {
            row *= model.row_scale(i);
        }
        terms.push((key, a));
    }
    let factor = JacobianFactor::new(terms, -model.whiten(&error))?;
    Ok(if model.is_constrained() {
        factor.into_constrained()
    } else {
        factor
    })
}

/// Factor on a single variable.
pub trait NoiseModelFactor1 {
    type X: Manifold;

    fn base(&self) -> &FactorBase;

    /// Residual at `x1`, filling `h1` with `∂h/∂x1` (`m × dim(x1)`) when given.
    fn evaluate_error(&self, x1: &Self::X, h1: Option<&mut DMatrix<f64>>) -> Result<DVector<f64>>;

    fn key1(&self) -> Key {
        self.base().keys()[0]
    }

    /// Whether the factor contributes at `values`.
    fn active(&self, _values: &Values) -> bool {
        true
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        let x1 = values.at::<Self::X>(self.key1())?;
        self.evaluate_error(x1, None)
    }

    /// Residual dimension `m`.
    fn dim(&self) -> usize {
        self.base().dim()
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        Ok(self.base().noise_model().whiten(&self.unwhitened_error(values)?))
    }

    /// `½ eᵀΣ⁻¹e`, zero when inactive.
    fn error(&self, values: &Values) -> Result<f64> {
        if !self.active(values) {
            return Ok(0.0);
        }
        Ok(self.base().noise_model().loss(&self.unwhitened_error(values)?))
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.active(values) {
            return Ok(None);
        }
        let x1 = values.at::<Self::X>(self.key1())?;
        let mut h1 = DMatrix::zeros(0, 0);
        let e = self.evaluate_error(x1, Some(&mut h1))?;
        whitened_system(self.base(), e, vec![h1]).map(Some)
    }
}

/// Factor on two variables.
pub trait NoiseModelFactor2 {
    type X1: Manifold;
    type X2: Manifold;

    fn base(&self) -> &FactorBase;

    fn evaluate_error(
        &self,
        x1: &Self::X1,
        x2: &Self::X2,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>>;

    fn key1(&self) -> Key {
        self.base().keys()[0]
    }

    fn key2(&self) -> Key {
        self.base().keys()[1]
    }

    fn active(&self, _values: &Values) -> bool {
        true
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        let x1 = values.at::<Self::X1>(self.key1())?;
        let x2 = values.at::<Self::X2>(self.key2())?;
        self.evaluate_error(x1, x2, None, None)
    }

    /// Residual dimension `m`.
    fn dim(&self) -> usize {
        self.base().dim()
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        Ok(self.base().noise_model().whiten(&self.unwhitened_error(values)?))
    }

    fn error(&self, values: &Values) -> Result<f64> {
        if !self.active(values) {
            return Ok(0.0);
        }
        Ok(self.base().noise_model().loss(&self.unwhitened_error(values)?))
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.active(values) {
            return Ok(None);
        }
        let x1 = values.at::<Self::X1>(self.key1())?;
        let x2 = values.at::<Self::X2>(self.key2())?;
        let (mut h1, mut h2) = (DMatrix::zeros(0, 0), DMatrix::zeros(0, 0));
        let e = self.evaluate_error(x1, x2, Some(&mut h1), Some(&mut h2))?;
        whitened_system(self.base(), e, vec![h1, h2]).map(Some)
    }
}

/// Factor on three variables.
pub trait NoiseModelFactor3 {
    type X1: Manifold;
    type X2: Manifold;
    type X3: Manifold;

    fn base(&self) -> &FactorBase;

    fn evaluate_error(
        &self,
        x1: &Self::X1,
        x2: &Self::X2,
        x3: &Self::X3,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
        h3: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>>;

    fn key1(&self) -> Key {
        self.base().keys()[0]
    }

    fn key2(&self) -> Key {
        self.base().keys()[1]
    }

    fn key3(&self) -> Key {
        self.base().keys()[2]
    }

    fn active(&self, _values: &Values) -> bool {
        true
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        let x1 = values.at::<Self::X1>(self.key1())?;
        let x2 = values.at::<Self::X2>(self.key2())?;
        let x3 = values.at::<Self::X3>(self.key3())?;
        self.evaluate_error(x1, x2, x3, None, None, None)
    }

    /// Residual dimension `m`.
    fn dim(&self) -> usize {
        self.base().dim()
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        Ok(self.base().noise_model().whiten(&self.unwhitened_error(values)?))
    }

    fn error(&self, values: &Values) -> Result<f64> {
        if !self.active(values) {
            return Ok(0.0);
        }
        Ok(self.base().noise_model().loss(&self.unwhitened_error(values)?))
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.active(values) {
            return Ok(None);
        }
        let x1 = values.at::<Self::X1>(self.key1())?;
        let x2 = values.at::<Self::X2>(self.key2())?;
        let x3 = values.at::<Self::X3>(self.key3())?;
        let mut h = [DMatrix::zeros(0, 0), DMatrix::zeros(0, 0), DMatrix::zeros(0, 0)];
        let [h1, h2, h3] = &mut h;
        let e = self.evaluate_error(x1, x2, x3, Some(h1), Some(h2), Some(h3))?;
        whitened_system(self.base(), e, h.into()).map(Some)
    }
}
