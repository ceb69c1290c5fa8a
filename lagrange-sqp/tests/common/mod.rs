#![allow(dead_code)]

use std::cell::Cell;

use lagrange::{FactorBase, Key, NoiseModelFactor1, NoiseModelFactor2, NoiseModelFactor3, Result};
use lagrange_sqp::{
    EqualityConstraint1, EqualityConstraint2, EqualityConstraint3, EqualityConstraintBase,
    HessianBlocks,
};
use nalgebra::{DMatrix, DVector, Vector2};

pub fn x(i: u64) -> Key {
    Key::symbol('x', i)
}

pub fn l(i: u64) -> Key {
    Key::symbol('l', i)
}

/// `h(x) = x² − 1`.
pub struct Quadratic {
    pub constraint: EqualityConstraintBase,
    pub evals: Cell<usize>,
}

impl Quadratic {
    pub fn new(key: Key, dual_key: Key) -> Self {
        Quadratic {
            constraint: EqualityConstraintBase::unary(key, 1, dual_key),
            evals: Cell::new(0),
        }
    }
}

impl NoiseModelFactor1 for Quadratic {
    type X = f64;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(&self, x: &f64, h1: Option<&mut DMatrix<f64>>) -> Result<DVector<f64>> {
        self.evals.set(self.evals.get() + 1);
        if let Some(h1) = h1 {
            *h1 = DMatrix::from_element(1, 1, 2.0 * x);
        }
        Ok(DVector::from_element(1, x * x - 1.0))
    }
}

impl EqualityConstraint1 for Quadratic {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// `h(x) = [x₀², x₀x₁]`.
pub struct SquareAndProduct {
    pub constraint: EqualityConstraintBase,
}

impl NoiseModelFactor1 for SquareAndProduct {
    type X = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        x: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        if let Some(h1) = h1 {
            *h1 = DMatrix::from_row_slice(2, 2, &[2.0 * x[0], 0.0, x[1], x[0]]);
        }
        Ok(DVector::from_vec(vec![x[0] * x[0], x[0] * x[1]]))
    }
}

impl EqualityConstraint1 for SquareAndProduct {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// `h(x) = x ⊗ x` for `x ∈ ℝ²`, components ordered `x₀x₀, x₀x₁, x₁x₀, x₁x₁`.
pub struct Kronecker {
    pub constraint: EqualityConstraintBase,
}

impl Kronecker {
    pub fn new(key: Key, dual_key: Key) -> Self {
        Kronecker {
            constraint: EqualityConstraintBase::unary(key, 4, dual_key),
        }
    }
}

impl NoiseModelFactor1 for Kronecker {
    type X = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        x: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        if let Some(h1) = h1 {
            *h1 = DMatrix::from_fn(4, 2, |k, c| {
                let (a, b) = (k / 2, k % 2);
                let mut d = 0.0;
                if a == c {
                    d += x[b];
                }
                if b == c {
                    d += x[a];
                }
                d
            });
        }
        Ok(DVector::from_fn(4, |k, _| x[k / 2] * x[k % 2]))
    }
}

impl EqualityConstraint1 for Kronecker {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// [`Kronecker`] with closed-form second derivatives.
pub struct AnalyticKronecker(pub Kronecker);

impl NoiseModelFactor1 for AnalyticKronecker {
    type X = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.0.base()
    }

    fn evaluate_error(
        &self,
        x: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        self.0.evaluate_error(x, h1)
    }
}

impl EqualityConstraint1 for AnalyticKronecker {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.0.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.0.constraint
    }

    fn evaluate_hessians(&self, _x1: &Vector2<f64>) -> Result<HessianBlocks> {
        // ∂²(xₐx_b)/∂x² = Eₐb + E_ba
        Ok((0..4)
            .map(|k| {
                let (a, b) = (k / 2, k % 2);
                let mut g = DMatrix::zeros(2, 2);
                g[(a, b)] += 1.0;
                g[(b, a)] += 1.0;
                g
            })
            .collect())
    }
}

/// `h(x, y) = xᵀy`.
pub struct Dot {
    pub constraint: EqualityConstraintBase,
}

impl NoiseModelFactor2 for Dot {
    type X1 = Vector2<f64>;
    type X2 = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        x: &Vector2<f64>,
        y: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        if let Some(h1) = h1 {
            *h1 = DMatrix::from_row_slice(1, 2, y.as_slice());
        }
        if let Some(h2) = h2 {
            *h2 = DMatrix::from_row_slice(1, 2, x.as_slice());
        }
        Ok(DVector::from_element(1, x.dot(y)))
    }
}

impl EqualityConstraint2 for Dot {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// `h(x, y) = [x₀²y₁, x₁y₀y₁]`, optionally with its arguments swapped.
pub struct Coupled {
    pub constraint: EqualityConstraintBase,
}

fn coupled(
    x: &Vector2<f64>,
    y: &Vector2<f64>,
    hx: Option<&mut DMatrix<f64>>,
    hy: Option<&mut DMatrix<f64>>,
) -> DVector<f64> {
    if let Some(hx) = hx {
        *hx = DMatrix::from_row_slice(2, 2, &[2.0 * x[0] * y[1], 0.0, 0.0, y[0] * y[1]]);
    }
    if let Some(hy) = hy {
        *hy = DMatrix::from_row_slice(2, 2, &[0.0, x[0] * x[0], x[1] * y[1], x[1] * y[0]]);
    }
    DVector::from_vec(vec![x[0] * x[0] * y[1], x[1] * y[0] * y[1]])
}

impl NoiseModelFactor2 for Coupled {
    type X1 = Vector2<f64>;
    type X2 = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        x: &Vector2<f64>,
        y: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        Ok(coupled(x, y, h1, h2))
    }
}

impl EqualityConstraint2 for Coupled {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// [`Coupled`] with the argument order reversed: `h(y, x)`.
pub struct CoupledSwapped {
    pub constraint: EqualityConstraintBase,
}

impl NoiseModelFactor2 for CoupledSwapped {
    type X1 = Vector2<f64>;
    type X2 = Vector2<f64>;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        y: &Vector2<f64>,
        x: &Vector2<f64>,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        Ok(coupled(x, y, h2, h1))
    }
}

impl EqualityConstraint2 for CoupledSwapped {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}

/// `h(x, y, z) = xyz` over scalars.
pub struct TripleProduct {
    pub constraint: EqualityConstraintBase,
}

impl NoiseModelFactor3 for TripleProduct {
    type X1 = f64;
    type X2 = f64;
    type X3 = f64;

    fn base(&self) -> &FactorBase {
        self.constraint.factor()
    }

    fn evaluate_error(
        &self,
        x: &f64,
        y: &f64,
        z: &f64,
        h1: Option<&mut DMatrix<f64>>,
        h2: Option<&mut DMatrix<f64>>,
        h3: Option<&mut DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        if let Some(h1) = h1 {
            *h1 = DMatrix::from_element(1, 1, y * z);
        }
        if let Some(h2) = h2 {
            *h2 = DMatrix::from_element(1, 1, x * z);
        }
        if let Some(h3) = h3 {
            *h3 = DMatrix::from_element(1, 1, x * y);
        }
        Ok(DVector::from_element(1, x * y * z))
    }
}

impl EqualityConstraint3 for TripleProduct {
    fn constraint(&self) -> &EqualityConstraintBase {
        &self.constraint
    }

    fn constraint_mut(&mut self) -> &mut EqualityConstraintBase {
        &mut self.constraint
    }
}
