//! Linear (Gaussian) factors handed to a downstream solver.
//!
//! [`HessianFactor`] is the quadratic form `½ xᵀGx − gᵀx + ½f` over a set of
//! keyed variables, stored as the augmented symmetric information matrix
//!
//! ```text
//! [ G   g ]
//! [ gᵀ  f ]
//! ```
//!
//! [`JacobianFactor`] is the least-squares term `½‖Σ Aᵢxᵢ − b‖²`.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::key::Key;
use crate::values::VectorValues;

/// Symmetric quadratic factor in upper-triangular block form.
#[derive(Clone, Debug, PartialEq)]
pub struct HessianFactor {
    keys: Vec<Key>,
    /// `offsets[i]..offsets[i + 1]` are the rows/columns of variable `i`.
    offsets: Vec<usize>,
    info: DMatrix<f64>,
}

impl HessianFactor {
    /// Single-variable factor `½ xᵀG₁₁x − g₁ᵀx + ½f`.
    pub fn unary(key: Key, g11: DMatrix<f64>, g1: DVector<f64>, f: f64) -> Result<Self> {
        Self::from_upper_blocks(vec![key], &[g11], &[g1], f)
    }

    /// Two-variable factor; `g12` couples `key1` (rows) with `key2` (columns).
    #[allow(clippy::too_many_arguments)]
    pub fn binary(
        key1: Key,
        key2: Key,
        g11: DMatrix<f64>,
        g12: DMatrix<f64>,
        g1: DVector<f64>,
        g22: DMatrix<f64>,
        g2: DVector<f64>,
        f: f64,
    ) -> Result<Self> {
        Self::from_upper_blocks(vec![key1, key2], &[g11, g12, g22], &[g1, g2], f)
    }

    /// Three-variable factor, upper blocks given row by row.
    #[allow(clippy::too_many_arguments)]
    pub fn ternary(
        key1: Key,
        key2: Key,
        key3: Key,
        g11: DMatrix<f64>,
        g12: DMatrix<f64>,
        g13: DMatrix<f64>,
        g1: DVector<f64>,
        g22: DMatrix<f64>,
        g23: DMatrix<f64>,
        g2: DVector<f64>,
        g33: DMatrix<f64>,
        g3: DVector<f64>,
        f: f64,
    ) -> Result<Self> {
        Self::from_upper_blocks(
            vec![key1, key2, key3],
            &[g11, g12, g13, g22, g23, g33],
            &[g1, g2, g3],
            f,
        )
    }

    /// Build from the upper-triangular blocks `G₁₁, G₁₂, …, G₁ₖ, G₂₂, …, Gₖₖ`
    /// (row-major over the upper triangle) and one linear term per key.
    ///
    /// Variable dimensions are taken from the linear terms; every block must
    /// match them. Only the upper triangle of each diagonal block is read.
    pub fn from_upper_blocks(
        keys: Vec<Key>,
        upper: &[DMatrix<f64>],
        linear: &[DVector<f64>],
        f: f64,
    ) -> Result<Self> {
        let k = keys.len();
        if linear.len() != k {
            return Err(Error::dimension("HessianFactor linear terms", k, linear.len()));
        }
        if upper.len() != k * (k + 1) / 2 {
            return Err(Error::dimension(
                "HessianFactor upper blocks",
                k * (k + 1) / 2,
                upper.len(),
            ));
        }

        let mut offsets = Vec::with_capacity(k + 1);
        offsets.push(0);
        for g in linear {
            offsets.push(offsets[offsets.len() - 1] + g.len());
        }
        let n = offsets[k];

        let pairs: Vec<(usize, usize)> = (0..k).flat_map(|i| (i..k).map(move |j| (i, j))).collect();
        for (&(i, j), block) in pairs.iter().zip(upper) {
            let rows = offsets[i + 1] - offsets[i];
            let cols = offsets[j + 1] - offsets[j];
            if block.nrows() != rows {
                return Err(Error::dimension("HessianFactor block rows", rows, block.nrows()));
            }
            if block.ncols() != cols {
                return Err(Error::dimension("HessianFactor block cols", cols, block.ncols()));
            }
        }

        let mut info = DMatrix::zeros(n + 1, n + 1);
        for (&(i, j), block) in pairs.iter().zip(upper) {
            for r in 0..block.nrows() {
                for c in 0..block.ncols() {
                    if i == j && c < r {
                        continue;
                    }
                    let (row, col) = (offsets[i] + r, offsets[j] + c);
                    info[(row, col)] = block[(r, c)];
                    info[(col, row)] = block[(r, c)];
                }
            }
        }
        for (i, g) in linear.iter().enumerate() {
            for (r, &gi) in g.iter().enumerate() {
                info[(offsets[i] + r, n)] = gi;
                info[(n, offsets[i] + r)] = gi;
            }
        }
        info[(n, n)] = f;

        Ok(HessianFactor {
            keys,
            offsets,
            info,
        })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Tangent dimension of the `i`-th variable.
    pub fn dim(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Total number of columns of `G`.
    pub fn cols(&self) -> usize {
        self.offsets[self.keys.len()]
    }

    /// Block `Gᵢⱼ`; blocks below the diagonal are transposes of the stored ones.
    pub fn block(&self, i: usize, j: usize) -> DMatrix<f64> {
        let (ri, ci) = (self.offsets[i], self.offsets[j]);
        self.info
            .view((ri, ci), (self.dim(i), self.dim(j)))
            .into_owned()
    }

    /// Linear term `gᵢ`.
    pub fn linear_term(&self, i: usize) -> DVector<f64> {
        let n = self.cols();
        DVector::from_iterator(
            self.dim(i),
            (self.offsets[i]..self.offsets[i + 1]).map(|r| self.info[(r, n)]),
        )
    }

    pub fn constant_term(&self) -> f64 {
        let n = self.cols();
        self.info[(n, n)]
    }

    /// The symmetric matrix `G` over all variables.
    pub fn information(&self) -> DMatrix<f64> {
        let n = self.cols();
        self.info.view((0, 0), (n, n)).into_owned()
    }

    /// The full augmented matrix `[G g; gᵀ f]`.
    pub fn augmented_information(&self) -> &DMatrix<f64> {
        &self.info
    }

    /// `½ xᵀGx − gᵀx + ½f` at the given tangent vectors.
    pub fn error(&self, x: &VectorValues) -> Result<f64> {
        let n = self.cols();
        let mut stacked = DVector::zeros(n);
        for (i, &key) in self.keys.iter().enumerate() {
            let xi = x.at(key)?;
            if xi.len() != self.dim(i) {
                return Err(Error::dimension("HessianFactor::error", self.dim(i), xi.len()));
            }
            stacked.rows_mut(self.offsets[i], xi.len()).copy_from(xi);
        }
        let g = self.info.view((0, n), (n, 1));
        let quad = (stacked.transpose() * self.information() * &stacked)[(0, 0)];
        let lin = (stacked.transpose() * g)[(0, 0)];
        Ok(0.5 * quad - lin + 0.5 * self.constant_term())
    }
}

/// Linear least-squares factor `½‖Σ Aᵢxᵢ − b‖²`.
#[derive(Clone, Debug, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
    constrained: bool,
}

impl JacobianFactor {
    /// Assemble from `(key, Aᵢ)` terms; every `Aᵢ` must have `b.len()` rows.
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, rhs: DVector<f64>) -> Result<Self> {
        for (_, a) in &terms {
            if a.nrows() != rhs.len() {
                return Err(Error::dimension("JacobianFactor block rows", rhs.len(), a.nrows()));
            }
        }
        let (keys, blocks) = terms.into_iter().unzip();
        Ok(JacobianFactor {
            keys,
            blocks,
            rhs,
            constrained: false,
        })
    }

    /// Mark rows as hard equalities rather than weighted residuals.
    pub fn into_constrained(mut self) -> Self {
        self.constrained = true;
        self
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn block(&self, i: usize) -> &DMatrix<f64> {
        &self.blocks[i]
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_constrained(&self) -> bool {
        self.constrained
    }

    /// `Σ Aᵢxᵢ − b`.
    pub fn residual(&self, x: &VectorValues) -> Result<DVector<f64>> {
        let mut r = -self.rhs.clone();
        for (key, a) in self.keys.iter().zip(&self.blocks) {
            let xi = x.at(*key)?;
            if xi.len() != a.ncols() {
                return Err(Error::dimension("JacobianFactor::residual", a.ncols(), xi.len()));
            }
            r += a * xi;
        }
        Ok(r)
    }

    pub fn error(&self, x: &VectorValues) -> Result<f64> {
        Ok(0.5 * self.residual(x)?.norm_squared())
    }
}
