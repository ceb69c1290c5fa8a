//! Central-difference Jacobians of vector-valued functions.
//!
//! Each `numerical_derivative_kj` differentiates a `k`-argument function with
//! respect to its `j`-th argument. Arguments are perturbed in their tangent
//! space (`x.retract(±δ eᵢ)`), so the result has one column per tangent
//! direction:
//!
//! ```text
//! J[:, i] = (f(x ⊕ δeᵢ) − f(x ⊕ −δeᵢ)) / 2δ
//! ```
//!
//! Callbacks return `Result`; the first failure is returned unchanged.

use nalgebra::{DMatrix, DVector};

use crate::manifold::Manifold;

/// Step used when the caller has no reason to pick another.
pub const DEFAULT_DELTA: f64 = 1e-5;

/// Differentiate `f` around the origin of an `n`-dimensional tangent space.
fn central_difference<E>(
    n: usize,
    delta: f64,
    mut f: impl FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
) -> Result<DMatrix<f64>, E> {
    let mut d = DVector::zeros(n);
    let mut jac: Option<DMatrix<f64>> = None;
    for i in 0..n {
        d[i] = delta;
        let plus = f(&d)?;
        d[i] = -delta;
        let minus = f(&d)?;
        d[i] = 0.0;

        let col = (plus - minus) / (2.0 * delta);
        let jac = jac.get_or_insert_with(|| DMatrix::zeros(col.len(), n));
        jac.set_column(i, &col);
    }
    match jac {
        Some(jac) => Ok(jac),
        // Zero-dimensional argument: the output size is still observable.
        None => {
            let m = f(&d)?.len();
            Ok(DMatrix::zeros(m, 0))
        }
    }
}

/// `∂f/∂x` for a unary function.
pub fn numerical_derivative_11<X, E>(
    mut f: impl FnMut(&X) -> Result<DVector<f64>, E>,
    x: &X,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X: Manifold,
{
    central_difference(x.dim(), delta, |d| f(&x.retract(d)))
}

/// `∂f/∂x₁` for a binary function.
pub fn numerical_derivative_21<X1, X2, E>(
    mut f: impl FnMut(&X1, &X2) -> Result<DVector<f64>, E>,
    x1: &X1,
    x2: &X2,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X1: Manifold,
    X2: Manifold,
{
    central_difference(x1.dim(), delta, |d| f(&x1.retract(d), x2))
}

/// `∂f/∂x₂` for a binary function.
pub fn numerical_derivative_22<X1, X2, E>(
    mut f: impl FnMut(&X1, &X2) -> Result<DVector<f64>, E>,
    x1: &X1,
    x2: &X2,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X1: Manifold,
    X2: Manifold,
{
    central_difference(x2.dim(), delta, |d| f(x1, &x2.retract(d)))
}

/// `∂f/∂x₁` for a ternary function.
pub fn numerical_derivative_31<X1, X2, X3, E>(
    mut f: impl FnMut(&X1, &X2, &X3) -> Result<DVector<f64>, E>,
    x1: &X1,
    x2: &X2,
    x3: &X3,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X1: Manifold,
    X2: Manifold,
    X3: Manifold,
{
    central_difference(x1.dim(), delta, |d| f(&x1.retract(d), x2, x3))
}

/// `∂f/∂x₂` for a ternary function.
pub fn numerical_derivative_32<X1, X2, X3, E>(
    mut f: impl FnMut(&X1, &X2, &X3) -> Result<DVector<f64>, E>,
    x1: &X1,
    x2: &X2,
    x3: &X3,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X1: Manifold,
    X2: Manifold,
    X3: Manifold,
{
    central_difference(x2.dim(), delta, |d| f(x1, &x2.retract(d), x3))
}

/// `∂f/∂x₃` for a ternary function.
pub fn numerical_derivative_33<X1, X2, X3, E>(
    mut f: impl FnMut(&X1, &X2, &X3) -> Result<DVector<f64>, E>,
    x1: &X1,
    x2: &X2,
    x3: &X3,
    delta: f64,
) -> Result<DMatrix<f64>, E>
where
    X1: Manifold,
    X2: Manifold,
    X3: Manifold,
{
    central_difference(x3.dim(), delta, |d| f(x1, x2, &x3.retract(d)))
}
