//! Equality constraints on a single variable.

use lagrange::numerical::numerical_derivative_11;
use lagrange::{
    HessianFactor, JacobianFactor, Key, Manifold, NoiseModelFactor1, Result, Values, VectorValues,
    DEFAULT_DELTA,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::constraint::{EqualityConstraintBase, NonlinearEqualityConstraint};
use crate::hessian::{
    check_multiplier, lagrangian_block, split_stack, transpose_vec, HessianBlocks,
};

/// `h(x₁) = 0`.
///
/// Implementors supply the residual through [`NoiseModelFactor1`] and
/// expose their [`EqualityConstraintBase`]; the Hessian comes for free.
pub trait EqualityConstraint1: NoiseModelFactor1 {
    fn constraint(&self) -> &EqualityConstraintBase;

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase;

    /// `∂²hₖ/∂x₁²` for every component `k`.
    ///
    /// Central differences of `vec((∂h/∂x₁)ᵀ)`; override with closed-form
    /// second derivatives when they are cheap.
    fn evaluate_hessians(&self, x1: &Self::X) -> Result<HessianBlocks> {
        let vec1 = |x: &Self::X| -> Result<DVector<f64>> {
            let mut h1 = DMatrix::zeros(0, 0);
            self.evaluate_error(x, Some(&mut h1))?;
            Ok(transpose_vec(&h1))
        };
        let g11 = numerical_derivative_11(vec1, x1, DEFAULT_DELTA)?;
        split_stack(&g11, x1.dim(), self.dim())
    }

    fn multiplied_hessian(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Option<HessianFactor>> {
        if !self.active(values) || !self.constraint().is_active() {
            debug!(dual_key = %self.constraint().dual_key(), "skipping inactive constraint");
            return Ok(None);
        }
        let x1 = values.at::<Self::X>(self.key1())?;
        let lambda = duals.at(self.constraint().dual_key())?;
        check_multiplier(lambda, self.dim())?;

        let g11 = self.evaluate_hessians(x1)?;
        let n1 = x1.dim();
        let l11 = lagrangian_block(&g11, lambda, n1, n1)?;
        HessianFactor::unary(self.key1(), l11, DVector::zeros(n1), 0.0).map(Some)
    }

    /// Erase into a [`NonlinearEqualityConstraint`].
    fn boxed(self) -> Box<dyn NonlinearEqualityConstraint>
    where
        Self: Sized + 'static,
    {
        Box::new(Unary(self))
    }
}

/// Object-safe view of an [`EqualityConstraint1`].
#[derive(Clone, Debug)]
pub struct Unary<T>(pub T);

impl<T: EqualityConstraint1> NonlinearEqualityConstraint for Unary<T> {
    fn keys(&self) -> &[Key] {
        self.0.base().keys()
    }

    fn dim(&self) -> usize {
        NoiseModelFactor1::dim(&self.0)
    }

    fn dual_key(&self) -> Key {
        self.0.constraint().dual_key()
    }

    fn is_active(&self) -> bool {
        self.0.constraint().is_active()
    }

    fn set_active(&mut self, active: bool) {
        self.0.constraint_mut().set_active(active);
    }

    fn active(&self, values: &Values) -> bool {
        self.0.constraint().is_active() && NoiseModelFactor1::active(&self.0, values)
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        NoiseModelFactor1::unwhitened_error(&self.0, values)
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.0.constraint().is_active() {
            return Ok(None);
        }
        NoiseModelFactor1::linearize(&self.0, values)
    }

    fn multiplied_hessian(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Option<HessianFactor>> {
        EqualityConstraint1::multiplied_hessian(&self.0, values, duals)
    }
}
