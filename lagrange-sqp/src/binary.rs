//! Equality constraints coupling two variables.

use lagrange::numerical::{numerical_derivative_21, numerical_derivative_22};
use lagrange::{
    HessianFactor, JacobianFactor, Key, Manifold, NoiseModelFactor2, Result, Values, VectorValues,
    DEFAULT_DELTA,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::constraint::{EqualityConstraintBase, NonlinearEqualityConstraint};
use crate::hessian::{
    check_multiplier, lagrangian_block, split_stack, transpose_vec, BinaryHessians,
};

/// `h(x₁, x₂) = 0`.
pub trait EqualityConstraint2: NoiseModelFactor2 {
    fn constraint(&self) -> &EqualityConstraintBase;

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase;

    /// `G₁₁`, `G₁₂` and `G₂₂`, numerically.
    ///
    /// `G₁ⱼ` differentiates `vec((∂h/∂x₁)ᵀ)` and `G₂₂` differentiates
    /// `vec((∂h/∂x₂)ᵀ)`; each residual call asks for a single Jacobian.
    fn evaluate_hessians(&self, x1: &Self::X1, x2: &Self::X2) -> Result<BinaryHessians> {
        let m = self.dim();
        let vec1 = |a: &Self::X1, b: &Self::X2| -> Result<DVector<f64>> {
            let mut h1 = DMatrix::zeros(0, 0);
            self.evaluate_error(a, b, Some(&mut h1), None)?;
            Ok(transpose_vec(&h1))
        };
        let vec2 = |a: &Self::X1, b: &Self::X2| -> Result<DVector<f64>> {
            let mut h2 = DMatrix::zeros(0, 0);
            self.evaluate_error(a, b, None, Some(&mut h2))?;
            Ok(transpose_vec(&h2))
        };

        let g11 = numerical_derivative_21(vec1, x1, x2, DEFAULT_DELTA)?;
        let g12 = numerical_derivative_22(vec1, x1, x2, DEFAULT_DELTA)?;
        let g22 = numerical_derivative_22(vec2, x1, x2, DEFAULT_DELTA)?;

        Ok(BinaryHessians {
            g11: split_stack(&g11, x1.dim(), m)?,
            g12: split_stack(&g12, x1.dim(), m)?,
            g22: split_stack(&g22, x2.dim(), m)?,
        })
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
        let x1 = values.at::<Self::X1>(self.key1())?;
        let x2 = values.at::<Self::X2>(self.key2())?;
        let lambda = duals.at(self.constraint().dual_key())?;
        check_multiplier(lambda, self.dim())?;

        let g = self.evaluate_hessians(x1, x2)?;
        let (n1, n2) = (x1.dim(), x2.dim());
        let l11 = lagrangian_block(&g.g11, lambda, n1, n1)?;
        let l12 = lagrangian_block(&g.g12, lambda, n1, n2)?;
        let l22 = lagrangian_block(&g.g22, lambda, n2, n2)?;
        HessianFactor::binary(
            self.key1(),
            self.key2(),
            l11,
            l12,
            DVector::zeros(n1),
            l22,
            DVector::zeros(n2),
            0.0,
        )
        .map(Some)
    }

    /// Erase into a [`NonlinearEqualityConstraint`].
    fn boxed(self) -> Box<dyn NonlinearEqualityConstraint>
    where
        Self: Sized + 'static,
    {
        Box::new(Binary(self))
    }
}

/// Object-safe view of an [`EqualityConstraint2`].
#[derive(Clone, Debug)]
pub struct Binary<T>(pub T);

impl<T: EqualityConstraint2> NonlinearEqualityConstraint for Binary<T> {
    fn keys(&self) -> &[Key] {
        self.0.base().keys()
    }

    fn dim(&self) -> usize {
        NoiseModelFactor2::dim(&self.0)
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
        self.0.constraint().is_active() && NoiseModelFactor2::active(&self.0, values)
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        NoiseModelFactor2::unwhitened_error(&self.0, values)
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.0.constraint().is_active() {
            return Ok(None);
        }
        NoiseModelFactor2::linearize(&self.0, values)
    }

    fn multiplied_hessian(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Option<HessianFactor>> {
        EqualityConstraint2::multiplied_hessian(&self.0, values, duals)
    }
}
