//! Tangent-space description of value types.
//!
//! Numerical derivatives and Jacobian blocks are expressed in local
//! coordinates: a value of type `V` is perturbed by `retract` with a tangent
//! vector of length `dim()`, and two values are compared with `local`.

use nalgebra::{DVector, SVector, UnitComplex};

/// A value living on a (possibly trivial) manifold.
pub trait Manifold: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Tangent dimension known at compile time, `None` for runtime-sized types.
    const DIM: Option<usize>;

    /// Tangent dimension of this particular value.
    fn dim(&self) -> usize;

    /// Move along the tangent vector `delta` (length `dim()`).
    fn retract(&self, delta: &DVector<f64>) -> Self;

    /// Tangent vector taking `self` to `other`, so that
    /// `self.retract(&self.local(other)) == other`.
    fn local(&self, other: &Self) -> DVector<f64>;
}

impl Manifold for f64 {
    const DIM: Option<usize> = Some(1);

    fn dim(&self) -> usize {
        1
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self + delta[0]
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        DVector::from_element(1, other - self)
    }
}

impl<const N: usize> Manifold for SVector<f64, N> {
    const DIM: Option<usize> = Some(N);

    fn dim(&self) -> usize {
        N
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self + delta.fixed_rows::<N>(0)
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice((other - self).as_slice())
    }
}

impl Manifold for DVector<f64> {
    const DIM: Option<usize> = None;

    fn dim(&self) -> usize {
        self.len()
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self + delta
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        other - self
    }
}

/// Planar rotation; the tangent is the rotation angle.
impl Manifold for UnitComplex<f64> {
    const DIM: Option<usize> = Some(1);

    fn dim(&self) -> usize {
        1
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self * UnitComplex::new(delta[0])
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        DVector::from_element(1, self.rotation_to(other).angle())
    }
}
