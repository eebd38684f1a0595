//! Dense-matrix and probability utilities for the fusion layer.
//!
//! The statistics side of the map (posteriors, fused cell estimates,
//! likelihoods) runs in f64; this module provides the small amount of
//! linear algebra it needs. Matrices here are block-local (at most
//! cells-per-block square), so a plain row-major layout with a Cholesky
//! factorization covers every use.

/// Dense row-major f64 matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create an identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Create a square matrix with the given diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let mut m = Self::zeros(diag.len(), diag.len());
        for (i, &v) in diag.iter().enumerate() {
            m.set(i, i, v);
        }
        m
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Element at (row, col).
    #[inline]
    pub fn at(&self, r: usize, c: usize) -> f64 {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    /// Set element at (row, col).
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = v;
    }

    /// Main diagonal as a vector.
    pub fn diagonal(&self) -> Vec<f64> {
        let n = self.rows.min(self.cols);
        (0..n).map(|i| self.at(i, i)).collect()
    }

    /// Element-wise sum of two matrices of identical shape.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    pub fn add(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.rows, other.rows, "matrix shape mismatch");
        assert_eq!(self.cols, other.cols, "matrix shape mismatch");
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Matrix-vector product.
    ///
    /// # Panics
    /// Panics if `v.len()` differs from the column count.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.cols, "vector length mismatch");
        let mut out = vec![0.0; self.rows];
        for r in 0..self.rows {
            let row = &self.data[r * self.cols..(r + 1) * self.cols];
            out[r] = row.iter().zip(v).map(|(a, b)| a * b).sum();
        }
        out
    }

    /// Cholesky factorization of a symmetric positive-definite matrix.
    ///
    /// Returns `None` if the matrix is not square, not positive definite,
    /// or produces non-finite pivots.
    pub fn cholesky(&self) -> Option<Cholesky> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let mut l = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let mut sum = self.at(i, j);
                for k in 0..j {
                    sum -= l.at(i, k) * l.at(j, k);
                }
                if i == j {
                    if !(sum > 0.0) || !sum.is_finite() {
                        return None;
                    }
                    l.set(i, j, sum.sqrt());
                } else {
                    l.set(i, j, sum / l.at(j, j));
                }
            }
        }
        Some(Cholesky { l })
    }
}

/// Lower-triangular Cholesky factor `L` with `A = L·Lᵀ`.
#[derive(Clone, Debug)]
pub struct Cholesky {
    l: Matrix,
}

impl Cholesky {
    /// Dimension of the factored matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.l.rows()
    }

    /// Solve `A·x = b` by forward/back substitution.
    ///
    /// # Panics
    /// Panics if `b.len()` differs from the factored dimension.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.dim();
        assert_eq!(b.len(), n, "vector length mismatch");

        // forward: L·y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.l.at(i, k) * y[k];
            }
            y[i] = sum / self.l.at(i, i);
        }

        // back: Lᵀ·x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= self.l.at(k, i) * x[k];
            }
            x[i] = sum / self.l.at(i, i);
        }
        x
    }

    /// Inverse of the factored matrix (column-by-column solve).
    pub fn inverse(&self) -> Matrix {
        let n = self.dim();
        let mut inv = Matrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for c in 0..n {
            e[c] = 1.0;
            let col = self.solve(&e);
            e[c] = 0.0;
            for r in 0..n {
                inv.set(r, c, col[r]);
            }
        }
        inv
    }
}

/// Error function, Abramowitz & Stegun 7.1.26 approximation.
///
/// Maximum absolute error about 1.5e-7, which is far below every
/// occupancy-threshold comparison this crate makes.
fn erf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard-normal cumulative distribution function Φ(x).
///
/// # Example
/// ```
/// use ghana_map::core::math::normal_cdf;
///
/// assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
/// assert!(normal_cdf(3.0) > 0.99);
/// assert!(normal_cdf(-3.0) < 0.01);
/// ```
#[inline]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_3x3() -> Matrix {
        // A = B·Bᵀ + I for a well-conditioned SPD test matrix
        let mut a = Matrix::zeros(3, 3);
        let rows = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                a.set(r, c, v);
            }
        }
        a
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let a = spd_3x3();
        let chol = a.cholesky().unwrap();
        // L·Lᵀ == A
        let n = 3;
        for i in 0..n {
            for j in 0..n {
                let mut v = 0.0;
                for k in 0..n {
                    v += chol.l.at(i, k) * chol.l.at(j, k);
                }
                assert_relative_eq!(v, a.at(i, j), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_solve() {
        let a = spd_3x3();
        let chol = a.cholesky().unwrap();
        let x_true = vec![1.0, -2.0, 0.5];
        let b = a.mul_vec(&x_true);
        let x = chol.solve(&b);
        for (got, want) in x.iter().zip(&x_true) {
            assert_relative_eq!(got, want, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cholesky_inverse() {
        let a = spd_3x3();
        let inv = a.cholesky().unwrap().inverse();
        // A·A⁻¹ == I
        for i in 0..3 {
            for j in 0..3 {
                let mut v = 0.0;
                for k in 0..3 {
                    v += a.at(i, k) * inv.at(k, j);
                }
                let want = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(v, want, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let m = Matrix::from_diagonal(&[1.0, -1.0]);
        assert!(m.cholesky().is_none());

        let rect = Matrix::zeros(2, 3);
        assert!(rect.cholesky().is_none());
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        for x in [0.1, 0.7, 1.3, 2.9] {
            assert_relative_eq!(normal_cdf(x) + normal_cdf(-x), 1.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_normal_cdf_known_values() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-9);
        // Φ(1.0) ≈ 0.8413447
        assert_relative_eq!(normal_cdf(1.0), 0.841_344_7, epsilon = 1e-6);
        // Φ(1.96) ≈ 0.9750021
        assert_relative_eq!(normal_cdf(1.96), 0.975_002_1, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_add_and_diagonal() {
        let a = Matrix::from_diagonal(&[1.0, 2.0]);
        let b = Matrix::identity(2);
        let sum = a.add(&b);
        assert_eq!(sum.diagonal(), vec![2.0, 3.0]);
    }
}
