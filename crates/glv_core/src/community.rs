use crate::error::{GlvError, Result};
use nalgebra::{DMatrix, DVector};

/// A pool of `S` species: interaction matrix `A` (effect of column species on
/// row species, negative diagonal for self-regulation), growth rates `r` and
/// carrying capacities `K`.
///
/// Dimensions are checked once at construction and the fields are read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    a: DMatrix<f64>,
    r: DVector<f64>,
    k: DVector<f64>,
}

impl Community {
    pub fn new(a: DMatrix<f64>, r: DVector<f64>, k: DVector<f64>) -> Result<Self> {
        let s = r.len();
        if s == 0 {
            return Err(GlvError::EmptyCommunity);
        }
        if k.len() != s {
            return Err(GlvError::DimensionMismatch {
                what: "carrying capacities",
                expected: s,
                actual: k.len(),
            });
        }
        if a.nrows() != s {
            return Err(GlvError::DimensionMismatch {
                what: "interaction matrix rows",
                expected: s,
                actual: a.nrows(),
            });
        }
        if a.ncols() != s {
            return Err(GlvError::DimensionMismatch {
                what: "interaction matrix columns",
                expected: s,
                actual: a.ncols(),
            });
        }
        for (what, values) in [
            ("interaction matrix entry", a.as_slice()),
            ("growth rate", r.as_slice()),
            ("carrying capacity", k.as_slice()),
        ] {
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(GlvError::NonFiniteParameter { what, index });
            }
        }
        Ok(Self { a, r, k })
    }

    /// Builds a community from a row-major interaction matrix.
    pub fn from_slices(a_row_major: &[f64], r: &[f64], k: &[f64]) -> Result<Self> {
        let s = r.len();
        if a_row_major.len() != s * s {
            return Err(GlvError::DimensionMismatch {
                what: "interaction matrix entries",
                expected: s * s,
                actual: a_row_major.len(),
            });
        }
        Self::new(
            DMatrix::from_row_slice(s, s, a_row_major),
            DVector::from_column_slice(r),
            DVector::from_column_slice(k),
        )
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn r(&self) -> &DVector<f64> {
        &self.r
    }

    pub fn k(&self) -> &DVector<f64> {
        &self.k
    }

    /// Species richness, i.e. the number of species `S`.
    pub fn richness(&self) -> usize {
        self.r.len()
    }

    /// The community restricted to `indices` (in the given order).
    pub fn subcommunity(&self, indices: &[usize]) -> Result<Self> {
        let s = self.richness();
        if let Some(&index) = indices.iter().find(|&&i| i >= s) {
            return Err(GlvError::SpeciesOutOfRange { index, richness: s });
        }
        let n = indices.len();
        let a = DMatrix::from_fn(n, n, |i, j| self.a[(indices[i], indices[j])]);
        let r = DVector::from_fn(n, |i, _| self.r[indices[i]]);
        let k = DVector::from_fn(n, |i, _| self.k[indices[i]]);
        Self::new(a, r, k)
    }

    /// "Core" interactions `b_ij = a_ij * K_i / K_j`, which decouple interaction
    /// statistics from heterogeneous carrying capacities (Barbier & Arnoldi 2017).
    pub fn core_interactions(&self) -> Result<DMatrix<f64>> {
        self.check_nonzero_capacities()?;
        let k = &self.k;
        Ok(DMatrix::from_fn(self.richness(), self.richness(), |i, j| {
            self.a[(i, j)] * k[i] / k[j]
        }))
    }

    pub(crate) fn check_nonzero_capacities(&self) -> Result<()> {
        match self.k.iter().position(|&k| k == 0.0) {
            Some(index) => Err(GlvError::InvalidCarryingCapacity { index }),
            None => Ok(()),
        }
    }
}

/// Off-diagonal entries of a square matrix keyed by `(i, j)`, row-major.
pub fn offdiag(matrix: &DMatrix<f64>) -> Vec<((usize, usize), f64)> {
    let mut entries = Vec::with_capacity(matrix.nrows() * matrix.ncols().saturating_sub(1));
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if i != j {
                entries.push(((i, j), matrix[(i, j)]));
            }
        }
    }
    entries
}
