//! Equality constraints on three variables.

use lagrange::numerical::{
    numerical_derivative_31, numerical_derivative_32, numerical_derivative_33,
};
use lagrange::{
    HessianFactor, JacobianFactor, Key, Manifold, NoiseModelFactor3, Result, Values, VectorValues,
    DEFAULT_DELTA,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::constraint::{EqualityConstraintBase, NonlinearEqualityConstraint};
use crate::hessian::{
    check_multiplier, lagrangian_block, split_stack, transpose_vec, TernaryHessians,
};

/// `h(x₁, x₂, x₃) = 0`.
pub trait EqualityConstraint3: NoiseModelFactor3 {
    fn constraint(&self) -> &EqualityConstraintBase;

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase;

    /// The six upper blocks `Gᵢⱼ`, `i ≤ j`, numerically.
    fn evaluate_hessians(
        &self,
        x1: &Self::X1,
        x2: &Self::X2,
        x3: &Self::X3,
    ) -> Result<TernaryHessians> {
        let m = self.dim();
        let vec1 = |a: &Self::X1, b: &Self::X2, c: &Self::X3| -> Result<DVector<f64>> {
            let mut h1 = DMatrix::zeros(0, 0);
            self.evaluate_error(a, b, c, Some(&mut h1), None, None)?;
            Ok(transpose_vec(&h1))
        };
        let vec2 = |a: &Self::X1, b: &Self::X2, c: &Self::X3| -> Result<DVector<f64>> {
            let mut h2 = DMatrix::zeros(0, 0);
            self.evaluate_error(a, b, c, None, Some(&mut h2), None)?;
            Ok(transpose_vec(&h2))
        };
        let vec3 = |a: &Self::X1, b: &Self::X2, c: &Self::X3| -> Result<DVector<f64>> {
            let mut h3 = DMatrix::zeros(0, 0);
            self.evaluate_error(a, b, c, None, None, Some(&mut h3))?;
            Ok(transpose_vec(&h3))
        };

        let (n1, n2, n3) = (x1.dim(), x2.dim(), x3.dim());
        let g11 = numerical_derivative_31(vec1, x1, x2, x3, DEFAULT_DELTA)?;
        let g12 = numerical_derivative_32(vec1, x1, x2, x3, DEFAULT_DELTA)?;
        let g13 = numerical_derivative_33(vec1, x1, x2, x3, DEFAULT_DELTA)?;
        let g22 = numerical_derivative_32(vec2, x1, x2, x3, DEFAULT_DELTA)?;
        let g23 = numerical_derivative_33(vec2, x1, x2, x3, DEFAULT_DELTA)?;
        let g33 = numerical_derivative_33(vec3, x1, x2, x3, DEFAULT_DELTA)?;

        Ok(TernaryHessians {
            g11: split_stack(&g11, n1, m)?,
            g12: split_stack(&g12, n1, m)?,
            g13: split_stack(&g13, n1, m)?,
            g22: split_stack(&g22, n2, m)?,
            g23: split_stack(&g23, n2, m)?,
            g33: split_stack(&g33, n3, m)?,
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
        let x3 = values.at::<Self::X3>(self.key3())?;
        let lambda = duals.at(self.constraint().dual_key())?;
        check_multiplier(lambda, self.dim())?;

        let g = self.evaluate_hessians(x1, x2, x3)?;
        let (n1, n2, n3) = (x1.dim(), x2.dim(), x3.dim());
        let l11 = lagrangian_block(&g.g11, lambda, n1, n1)?;
        let l12 = lagrangian_block(&g.g12, lambda, n1, n2)?;
        let l13 = lagrangian_block(&g.g13, lambda, n1, n3)?;
        let l22 = lagrangian_block(&g.g22, lambda, n2, n2)?;
        let l23 = lagrangian_block(&g.g23, lambda, n2, n3)?;
        let l33 = lagrangian_block(&g.g33, lambda, n3, n3)?;
        HessianFactor::ternary(
            self.key1(),
            self.key2(),
            self.key3(),
            l11,
            l12,
            l13,
            DVector::zeros(n1),
            l22,
            l23,
            DVector::zeros(n2),
            l33,
            DVector::zeros(n3),
            0.0,
        )
        .map(Some)
    }

    fn boxed(self) -> Box<dyn NonlinearEqualityConstraint>
    where
        Self: Sized + 'static,
    {
        Box::new(Ternary(self))
    }
}

/// Object-safe view of an [`EqualityConstraint3`].
#[derive(Clone, Debug)]
pub struct Ternary<T>(pub T);

impl<T: EqualityConstraint3> NonlinearEqualityConstraint for Ternary<T> {
    fn keys(&self) -> &[Key] {
        self.0.base().keys()
    }

    fn dim(&self) -> usize {
        NoiseModelFactor3::dim(&self.0)
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
        self.0.constraint().is_active() && NoiseModelFactor3::active(&self.0, values)
    }

    fn unwhitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        NoiseModelFactor3::unwhitened_error(&self.0, values)
    }

    fn linearize(&self, values: &Values) -> Result<Option<JacobianFactor>> {
        if !self.0.constraint().is_active() {
            return Ok(None);
        }
        NoiseModelFactor3::linearize(&self.0, values)
    }

    fn multiplied_hessian(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Option<HessianFactor>> {
        EqualityConstraint3::multiplied_hessian(&self.0, values, duals)
    }
}
