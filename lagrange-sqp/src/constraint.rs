//! Nonlinear equality constraints `h(x) = 0` with a dual variable.

use lagrange::{
    FactorBase, HessianFactor, JacobianFactor, Key, NoiseModel, Result, Values, VectorValues,
};
use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A hard equality `h(x) = 0` on a handful of keyed variables.
///
/// Besides the residual, every constraint names the key of its Lagrange
/// multiplier `λ ∈ ℝᵐ` and can produce `−Σₖ λₖ ∂²hₖ`, the constraint's
/// contribution to the Hessian of the Lagrangian.
pub trait NonlinearEqualityConstraint {
    /// Variables the residual depends on, in argument order.
    fn keys(&self) -> &[Key];

    /// Residual dimension `m`.
    fn dim(&self) -> usize;

    /// Key of `λ` in the dual `VectorValues`.
    fn dual_key(&self) -> Key;

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// The activity flag combined with the factor's own `active(values)`.
    fn active(&self, values: &Values) -> bool;

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>>;

    /// Linearised constraint rows, `None` when inactive.
    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>>;

    /// `−Σₖ λₖ ∂²hₖ` at `values` as a symmetric quadratic factor over
    /// [`keys`](Self::keys), with zero linear terms and zero constant.
    ///
    /// Returns `None` without evaluating the residual when inactive.
    fn multiplied_hessian(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Option<HessianFactor>>;
}

fn default_active() -> bool {
    true
}

/// State shared by every equality constraint.
///
/// Only the residual-factor part is serialised; the dual key and the
/// activity flag are restored by the owner (`active` comes back `true`).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EqualityConstraintBase {
    factor: FactorBase,
    #[cfg_attr(feature = "serde", serde(skip))]
    dual_key: Key,
    #[cfg_attr(feature = "serde", serde(skip, default = "default_active"))]
    active: bool,
}

impl EqualityConstraintBase {
    /// `m` hard-equality rows over `keys`, multiplier stored at `dual_key`.
    pub fn new(keys: Vec<Key>, m: usize, dual_key: Key) -> Self {
        EqualityConstraintBase {
            factor: FactorBase::new(NoiseModel::constrained_all(m), keys),
            dual_key,
            active: default_active(),
        }
    }

    pub fn unary(key1: Key, m: usize, dual_key: Key) -> Self {
        Self::new(vec![key1], m, dual_key)
    }

    pub fn binary(key1: Key, key2: Key, m: usize, dual_key: Key) -> Self {
        Self::new(vec![key1, key2], m, dual_key)
    }

    pub fn ternary(key1: Key, key2: Key, key3: Key, m: usize, dual_key: Key) -> Self {
        Self::new(vec![key1, key2, key3], m, dual_key)
    }

    pub fn factor(&self) -> &FactorBase {
        &self.factor
    }

    pub fn dual_key(&self) -> Key {
        self.dual_key
    }

    pub fn set_dual_key(&mut self, dual_key: Key) {
        self.dual_key = dual_key;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}
