//! A set of equality constraints evaluated together.

use lagrange::{HessianFactor, JacobianFactor, Key, Result, Values, VectorValues};
use nalgebra::DVector;
use tracing::debug;

use crate::constraint::NonlinearEqualityConstraint;

/// Owned list of constraints in insertion order.
#[derive(Default)]
pub struct ConstraintGraph {
    constraints: Vec<Box<dyn NonlinearEqualityConstraint>>,
}

impl ConstraintGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: Box<dyn NonlinearEqualityConstraint>) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&dyn NonlinearEqualityConstraint> {
        self.constraints.get(i).map(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut (dyn NonlinearEqualityConstraint + 'static)> {
        self.constraints.get_mut(i).map(|c| c.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn NonlinearEqualityConstraint> + '_ {
        self.constraints.iter().map(|c| c.as_ref())
    }

    /// Zero multipliers for every constraint, keyed by dual key.
    pub fn zero_duals(&self) -> VectorValues {
        self.constraints
            .iter()
            .map(|c| (c.dual_key(), DVector::zeros(c.dim())))
            .collect()
    }

    /// Dual keys paired with residual dimensions.
    pub fn dual_dims(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        self.constraints.iter().map(|c| (c.dual_key(), c.dim()))
    }

    /// Lagrangian Hessian contributions of every active constraint.
    pub fn multiplied_hessians(
        &self,
        values: &Values,
        duals: &VectorValues,
    ) -> Result<Vec<HessianFactor>> {
        let mut factors = Vec::with_capacity(self.constraints.len());
        for constraint in &self.constraints {
            if let Some(factor) = constraint.multiplied_hessian(values, duals)? {
                factors.push(factor);
            }
        }
        debug!(
            constraints = self.constraints.len(),
            factors = factors.len(),
            "collected multiplied Hessians"
        );
        Ok(factors)
    }

    /// Stacked residuals of the active constraints, in insertion order.
    pub fn violation(&self, values: &Values) -> Result<DVector<f64>> {
        let mut parts = Vec::new();
        for constraint in self.constraints.iter().filter(|c| c.active(values)) {
            parts.push(constraint.unwhitened_error(values)?);
        }
        let rows = parts.iter().map(|p| p.len()).sum();
        let mut stacked = DVector::zeros(rows);
        let mut offset = 0;
        for part in parts {
            stacked.rows_mut(offset, part.len()).copy_from(&part);
            offset += part.len();
        }
        Ok(stacked)
    }

    /// Linearised constraint rows of the active constraints.
    pub fn linearize(&self, values: &Values) -> Result<Vec<JacobianFactor>> {
        let mut factors = Vec::with_capacity(self.constraints.len());
        for constraint in &self.constraints {
            if let Some(factor) = constraint.linearize(values)? {
                factors.push(factor);
            }
        }
        Ok(factors)
    }
}
