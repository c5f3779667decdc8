//! Linear system assembly and dense LU solve.

use crate::error::{MagError, Result};

/// Pivots below this fraction of the largest entry count as zero.
const PIVOT_EPSILON: f64 = 1e-15;

/// Linearised magnetic system Ax = z.
#[derive(Debug, Clone)]
pub struct SystemMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Source vector z
    pub z: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
}

impl SystemMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Clear the matrix and source vector. The last solution is kept.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    pub fn add_source(&mut self, row: usize, value: f64) {
        self.z[row] += value;
    }

    /// Stamp a permeance between two nodes (`None` is the reference node).
    ///
    /// ```text
    /// A[a,a] += g   A[a,b] -= g
    /// A[b,a] -= g   A[b,b] += g
    /// ```
    pub fn stamp_permeance(&mut self, a: Option<usize>, b: Option<usize>, g: f64) {
        if let Some(i) = a {
            self.add(i, i, g);
        }
        if let Some(j) = b {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (a, b) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp a flux source driving `flux` through the branch from `a` to `b`.
    pub fn stamp_flux_source(&mut self, a: Option<usize>, b: Option<usize>, flux: f64) {
        if let Some(i) = a {
            self.add_source(i, -flux);
        }
        if let Some(j) = b {
            self.add_source(j, flux);
        }
    }

    /// Stamp the ampere-turns `turns * I` of an unknown current at column
    /// `col` into a branch of permeance `g` from `a` to `b`.
    pub fn stamp_ampere_turns(&mut self, a: Option<usize>, b: Option<usize>, col: usize, g_turns: f64) {
        if let Some(i) = a {
            self.add(i, col, g_turns);
        }
        if let Some(j) = b {
            self.add(j, col, -g_turns);
        }
    }

    /// LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        let scale = self.a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let tiny = PIVOT_EPSILON * scale;

        for k in 0..n {
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if !(max_val > tiny) {
                return Err(MagError::SingularMatrix);
            }

            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve with the factors from [`SystemMatrix::factor`].
    pub fn solve(&mut self) -> Result<()> {
        let n = self.size;

        for i in 0..n {
            self.x[i] = self.z[self.pivots[i]];
        }

        // L y = P z
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // U x = y
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] /= self.lu[i * n + i];
        }

        if self.x.iter().any(|v| !v.is_finite()) {
            return Err(MagError::SingularMatrix);
        }
        Ok(())
    }

    /// Factor and solve in one call.
    pub fn factor_and_solve(&mut self) -> Result<&[f64]> {
        self.factor()?;
        self.solve()?;
        Ok(&self.x)
    }
}
