//! Dense vector and matrix primitives for small colour-space models.
//!
//! Vectors are plain `&[f64]` slices; [`Matrix`] is a row-major dense
//! matrix. Shape mismatches are programming errors and panic, the same way
//! slice indexing does. Numerical failure (a singular matrix) is reported
//! through `Option`.

use std::ops::{Index, IndexMut};

/// Dot product of two equally sized vectors
///
/// # Panics
///
/// Panics if the lengths differ.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "dot: length mismatch");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Element-wise `a - b`
#[inline]
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "sub: length mismatch");
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Element-wise `a + b`
#[inline]
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len(), "add: length mismatch");
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

#[inline]
pub fn scale(a: &[f64], factor: f64) -> Vec<f64> {
    a.iter().map(|x| x * factor).collect()
}

/// Euclidean length
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Euclidean distance between two points
#[inline]
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "distance: length mismatch");
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Row-major dense matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut matrix = Self::zeros(n, n);
        for i in 0..n {
            matrix[(i, i)] = 1.0;
        }
        matrix
    }

    /// Builds a matrix from nested rows
    ///
    /// # Panics
    ///
    /// Panics if the rows are ragged.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let cols = rows.first().map_or(0, |row| row.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            assert_eq!(row.len(), cols, "from_rows: ragged rows");
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    /// Outer product `a bᵗ`
    pub fn outer(a: &[f64], b: &[f64]) -> Self {
        let mut data = Vec::with_capacity(a.len() * b.len());
        for x in a {
            data.extend(b.iter().map(|y| x * y));
        }
        Self {
            rows: a.len(),
            cols: b.len(),
            data,
        }
    }

    #[inline]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub const fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn transpose(&self) -> Self {
        let mut result = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                result[(c, r)] = self[(r, c)];
            }
        }
        result
    }

    pub fn mul(&self, other: &Self) -> Self {
        assert_eq!(self.cols, other.rows, "mul: shape mismatch");
        let mut result = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self[(r, k)];
                if lhs == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    result[(r, c)] += lhs * other[(k, c)];
                }
            }
        }
        result
    }

    pub fn mul_vector(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.cols, v.len(), "mul_vector: shape mismatch");
        (0..self.rows).map(|r| dot(self.row(r), v)).collect()
    }

    pub fn add(&self, other: &Self) -> Self {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "add: shape mismatch"
        );
        Self {
            rows: self.rows,
            cols: self.cols,
            data: add(&self.data, &other.data),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "sub: shape mismatch"
        );
        Self {
            rows: self.rows,
            cols: self.cols,
            data: sub(&self.data, &other.data),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: scale(&self.data, factor),
        }
    }

    /// `xᵗ M x` for a square matrix
    pub fn quadratic_form(&self, x: &[f64]) -> f64 {
        dot(x, &self.mul_vector(x))
    }

    /// Determinant via LU decomposition with partial pivoting
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not square.
    pub fn determinant(&self) -> f64 {
        assert!(self.is_square(), "determinant: matrix is not square");
        let n = self.rows;
        let mut lu = self.data.clone();
        let mut det = 1.0;

        for col in 0..n {
            let pivot_row = (col..n)
                .max_by(|&a, &b| lu[a * n + col].abs().total_cmp(&lu[b * n + col].abs()))
                .unwrap_or(col);
            let pivot = lu[pivot_row * n + col];
            if pivot == 0.0 {
                return 0.0;
            }
            if pivot_row != col {
                swap_rows(&mut lu, n, pivot_row, col);
                det = -det;
            }
            det *= pivot;

            for row in col + 1..n {
                let factor = lu[row * n + col] / pivot;
                for k in col..n {
                    lu[row * n + k] -= factor * lu[col * n + k];
                }
            }
        }

        det
    }

    /// Inverse via Gauss-Jordan elimination with partial pivoting
    ///
    /// Returns `None` when a pivot vanishes relative to the largest
    /// magnitude in the matrix.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not square.
    pub fn inverse(&self) -> Option<Self> {
        assert!(self.is_square(), "inverse: matrix is not square");
        let n = self.rows;
        let largest = self.data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if largest == 0.0 || !largest.is_finite() {
            return None;
        }
        let threshold = largest * f64::EPSILON * n as f64;

        let mut work = self.data.clone();
        let mut inverse = Self::identity(n).data;

        for col in 0..n {
            let pivot_row = (col..n)
                .max_by(|&a, &b| work[a * n + col].abs().total_cmp(&work[b * n + col].abs()))
                .unwrap_or(col);
            let pivot = work[pivot_row * n + col];
            if pivot.abs() <= threshold {
                return None;
            }
            if pivot_row != col {
                swap_rows(&mut work, n, pivot_row, col);
                swap_rows(&mut inverse, n, pivot_row, col);
            }

            for k in 0..n {
                work[col * n + k] /= pivot;
                inverse[col * n + k] /= pivot;
            }

            for row in (0..n).filter(|&row| row != col) {
                let factor = work[row * n + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    work[row * n + k] -= factor * work[col * n + k];
                    inverse[row * n + k] -= factor * inverse[col * n + k];
                }
            }
        }

        Some(Self {
            rows: n,
            cols: n,
            data: inverse,
        })
    }
}

fn swap_rows(data: &mut [f64], n: usize, a: usize, b: usize) {
    for k in 0..n {
        data.swap(a * n + k, b * n + k);
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(row < self.rows && col < self.cols, "matrix index out of range");
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(row < self.rows && col < self.cols, "matrix index out of range");
        &mut self.data[row * self.cols + col]
    }
}
