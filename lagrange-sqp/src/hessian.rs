//! Second-derivative blocks of a vector residual and their λ-weighted sum.
//!
//! For a residual `h : X₁ × … × Xₖ → ℝᵐ` the default Hessian differentiates
//! the transposed, column-major flattened Jacobian
//!
//! ```text
//! vecᵢ(x) = vec((∂h/∂xᵢ)ᵀ) ∈ ℝ^(nᵢ·m)
//! ```
//!
//! with respect to `xⱼ`. The result is a vertical stack of `m` blocks of
//! shape `nᵢ × nⱼ`, the k-th being `∂²hₖ/∂xᵢ∂xⱼ`.

use lagrange::{Error, Result};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// `∂²hₖ/∂xᵢ∂xⱼ` for `k = 0..m`, one matrix per residual component.
pub type HessianBlocks = Vec<DMatrix<f64>>;

/// Second derivatives of a two-variable residual, upper triangle only.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryHessians {
    pub g11: HessianBlocks,
    pub g12: HessianBlocks,
    pub g22: HessianBlocks,
}

/// Second derivatives of a three-variable residual, upper triangle only.
#[derive(Clone, Debug, PartialEq)]
pub struct TernaryHessians {
    pub g11: HessianBlocks,
    pub g12: HessianBlocks,
    pub g13: HessianBlocks,
    pub g22: HessianBlocks,
    pub g23: HessianBlocks,
    pub g33: HessianBlocks,
}

/// `vec(Hᵀ)`: the rows of `H` laid end to end.
pub fn transpose_vec(h: &DMatrix<f64>) -> DVector<f64> {
    let ht = h.transpose();
    DVector::from_column_slice(ht.as_slice())
}

/// Cut a stacked second-derivative matrix into blocks of `block_rows` rows.
///
/// A stack with zero `block_rows` is only valid when it is itself empty and
/// then yields `m` empty blocks.
pub fn split_stack(stack: &DMatrix<f64>, block_rows: usize, m: usize) -> Result<HessianBlocks> {
    let rows = stack.nrows();
    if block_rows == 0 {
        if rows != 0 {
            return Err(Error::MalformedHessian { rows, block_rows });
        }
        return Ok(vec![DMatrix::zeros(0, stack.ncols()); m]);
    }
    if rows % block_rows != 0 {
        return Err(Error::MalformedHessian { rows, block_rows });
    }
    Ok((0..rows / block_rows)
        .map(|k| stack.rows(k * block_rows, block_rows).into_owned())
        .collect())
}

/// Check the multiplier vector against the residual dimension.
pub(crate) fn check_multiplier(lambda: &DVector<f64>, m: usize) -> Result<()> {
    if lambda.len() != m {
        return Err(Error::dimension("dual variable", m, lambda.len()));
    }
    Ok(())
}

/// `Σₖ −λₖ Gₖ` for one `(i, j)` pair.
///
/// There must be exactly one `rows × cols` block per multiplier.
pub(crate) fn lagrangian_block(
    blocks: &[DMatrix<f64>],
    lambda: &DVector<f64>,
    rows: usize,
    cols: usize,
) -> Result<DMatrix<f64>> {
    if blocks.len() != lambda.len() {
        return Err(Error::dimension("Hessian block count", lambda.len(), blocks.len()));
    }
    let mut sum = DMatrix::zeros(rows, cols);
    for (g, &l) in blocks.iter().zip(lambda.iter()) {
        if g.nrows() != rows {
            return Err(Error::dimension("Hessian block rows", rows, g.nrows()));
        }
        if g.ncols() != cols {
            return Err(Error::dimension("Hessian block cols", cols, g.ncols()));
        }
        sum -= g * l;
    }
    debug!(rows, cols, m = lambda.len(), "assembled Lagrangian Hessian block");
    Ok(sum)
}
