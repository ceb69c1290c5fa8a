//! Gaussian noise models, including hard equality constraints.

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Penalty weight applied to zero-sigma components when a constrained
/// residual is folded into a least-squares cost.
pub const DEFAULT_MU: f64 = 1000.0;

/// Weighting applied to a factor residual.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NoiseModel {
    /// Identity covariance.
    Unit(usize),
    /// `σ²I` covariance.
    Isotropic { dim: usize, sigma: f64 },
    /// Per-component standard deviations.
    Diagonal(DVector<f64>),
    /// Per-component sigmas where zero marks a hard equality; `mu` holds the
    /// penalty weight of every component.
    Constrained {
        sigmas: DVector<f64>,
        mu: DVector<f64>,
    },
}

impl NoiseModel {
    /// Every component of an `m`-dimensional residual is a hard equality.
    pub fn constrained_all(m: usize) -> Self {
        NoiseModel::Constrained {
            sigmas: DVector::zeros(m),
            mu: DVector::from_element(m, DEFAULT_MU),
        }
    }

    pub fn isotropic(dim: usize, sigma: f64) -> Self {
        NoiseModel::Isotropic { dim, sigma }
    }

    /// Residual dimension this model weights.
    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Unit(dim) => *dim,
            NoiseModel::Isotropic { dim, .. } => *dim,
            NoiseModel::Diagonal(sigmas) => sigmas.len(),
            NoiseModel::Constrained { sigmas, .. } => sigmas.len(),
        }
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self, NoiseModel::Constrained { .. })
    }

    /// Scale a residual to unit covariance.
    ///
    /// Zero-sigma components of a constrained model are left unscaled: they
    /// stay exact equality rows for the linear solver.
    pub fn whiten(&self, e: &DVector<f64>) -> DVector<f64> {
        match self {
            NoiseModel::Unit(_) => e.clone(),
            NoiseModel::Isotropic { sigma, .. } => e / *sigma,
            NoiseModel::Diagonal(sigmas) => e.component_div(sigmas),
            NoiseModel::Constrained { sigmas, .. } => {
                DVector::from_fn(e.len(), |i, _| {
                    if sigmas[i] == 0.0 {
                        e[i]
                    } else {
                        e[i] / sigmas[i]
                    }
                })
            }
        }
    }

    /// Per-row scale factor used by [`whiten`](Self::whiten).
    pub(crate) fn row_scale(&self, i: usize) -> f64 {
        match self {
            NoiseModel::Unit(_) => 1.0,
            NoiseModel::Isotropic { sigma, .. } => 1.0 / sigma,
            NoiseModel::Diagonal(sigmas) => 1.0 / sigmas[i],
            NoiseModel::Constrained { sigmas, .. } => {
                if sigmas[i] == 0.0 {
                    1.0
                } else {
                    1.0 / sigmas[i]
                }
            }
        }
    }

    /// `eᵀΣ⁻¹e`, with zero-sigma components weighted by their `mu`.
    pub fn squared_mahalanobis_distance(&self, e: &DVector<f64>) -> f64 {
        match self {
            NoiseModel::Constrained { sigmas, mu } => e
                .iter()
                .enumerate()
                .map(|(i, &ei)| {
                    if sigmas[i] == 0.0 {
                        mu[i] * ei * ei
                    } else {
                        let w = ei / sigmas[i];
                        w * w
                    }
                })
                .sum(),
            _ => self.whiten(e).norm_squared(),
        }
    }

    /// Least-squares cost `½ eᵀΣ⁻¹e`.
    pub fn loss(&self, e: &DVector<f64>) -> f64 {
        0.5 * self.squared_mahalanobis_distance(e)
    }
}
