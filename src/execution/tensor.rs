//! Dense Matrix
//!
//! Row-major `f32` matrix with just enough operations for the synthetic
//! workloads: random initialisation, matrix products and the few
//! element-wise helpers a two-layer network needs for backpropagation.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;

use super::workload::WorkloadError;

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Creates a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self, WorkloadError> {
        check_dimensions(rows, cols)?;
        Ok(Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        })
    }

    /// Wraps existing row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, WorkloadError> {
        check_dimensions(rows, cols)?;
        if data.len() != rows * cols {
            return Err(WorkloadError::InvalidParameter(format!(
                "expected {} values for a {}x{} matrix, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Samples every entry uniformly from `[min, max)`.
    pub fn random_uniform<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        rng: &mut R,
    ) -> Result<Self, WorkloadError> {
        check_dimensions(rows, cols)?;
        if !(min < max) {
            return Err(WorkloadError::InvalidParameter(format!(
                "uniform bounds must satisfy min < max (got {} and {})",
                min, max
            )));
        }

        let distribution = Uniform::new(min, max);
        let data = (0..rows * cols).map(|_| distribution.sample(&mut *rng)).collect();
        Ok(Self { rows, cols, data })
    }

    /// Samples every entry from a normal distribution.
    pub fn random_normal<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        rng: &mut R,
    ) -> Result<Self, WorkloadError> {
        check_dimensions(rows, cols)?;
        if !(std > 0.0) {
            return Err(WorkloadError::InvalidParameter(format!(
                "standard deviation must be positive (got {})",
                std
            )));
        }

        let data = (0..rows * cols)
            .map(|_| {
                let sample: f64 = StandardNormal.sample(&mut *rng);
                mean + std * sample as f32
            })
            .collect();
        Ok(Self { rows, cols, data })
    }

    /// Returns `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns the row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Matrix product `self × other`.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix, WorkloadError> {
        if self.cols != other.rows {
            return Err(WorkloadError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }

        let (rows, inner, cols) = (self.rows, self.cols, other.cols);
        let mut out = vec![0.0f32; rows * cols];

        // i-k-j order keeps the inner loop on contiguous rows of both operands
        for r in 0..rows {
            let out_row = &mut out[r * cols..(r + 1) * cols];
            for k in 0..inner {
                let a = self.data[r * inner + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &other.data[k * cols..(k + 1) * cols];
                for (o, b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }

        Ok(Matrix {
            rows,
            cols,
            data: out,
        })
    }

    /// Returns the transposed matrix.
    pub fn transpose(&self) -> Matrix {
        let mut data = vec![0.0f32; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Matrix {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Element-wise `self - other`.
    pub fn sub(&self, other: &Matrix) -> Result<Matrix, WorkloadError> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise combination of two equally shaped matrices.
    pub fn zip_map<F>(&self, other: &Matrix, f: F) -> Result<Matrix, WorkloadError>
    where
        F: Fn(f32, f32) -> f32,
    {
        if self.shape() != other.shape() {
            return Err(WorkloadError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }

        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| f(*a, *b))
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Applies `f` to every entry.
    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Adds `row` to every row of the matrix.
    pub fn add_row(&mut self, row: &[f32]) -> Result<(), WorkloadError> {
        if row.len() != self.cols {
            return Err(WorkloadError::ShapeMismatch {
                left: self.shape(),
                right: (1, row.len()),
            });
        }
        for chunk in self.data.chunks_mut(self.cols) {
            for (v, b) in chunk.iter_mut().zip(row) {
                *v += b;
            }
        }
        Ok(())
    }

    /// In-place `self += factor * other`.
    pub fn add_scaled(&mut self, other: &Matrix, factor: f32) -> Result<(), WorkloadError> {
        if self.shape() != other.shape() {
            return Err(WorkloadError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        for (v, o) in self.data.iter_mut().zip(&other.data) {
            *v += factor * o;
        }
        Ok(())
    }

    /// Sums each column.
    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.cols];
        for chunk in self.data.chunks(self.cols) {
            for (s, v) in sums.iter_mut().zip(chunk) {
                *s += v;
            }
        }
        sums
    }

    /// Mean of all entries.
    pub fn mean(&self) -> f64 {
        let sum: f64 = self.data.iter().map(|v| *v as f64).sum();
        sum / self.data.len() as f64
    }

    /// Mean of the squared entries.
    pub fn mean_square(&self) -> f64 {
        let sum: f64 = self.data.iter().map(|v| (*v as f64) * (*v as f64)).sum();
        sum / self.data.len() as f64
    }
}

fn check_dimensions(rows: usize, cols: usize) -> Result<(), WorkloadError> {
    if rows == 0 || cols == 0 {
        return Err(WorkloadError::InvalidParameter(format!(
            "matrix dimensions must be non-zero (got {}x{})",
            rows, cols
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_matmul_small() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Matrix::zeros(2, 3).unwrap();
        let b = Matrix::zeros(2, 3).unwrap();

        let err = a.matmul(&b).unwrap_err();
        assert!(matches!(err, WorkloadError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(Matrix::zeros(0, 4).is_err());
        assert!(Matrix::from_vec(2, 0, vec![]).is_err());
    }

    #[test]
    fn test_from_vec_length_checked() {
        assert!(Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = a.transpose();

        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn test_random_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = Matrix::random_uniform(8, 8, 0.0, 1.0, &mut rng).unwrap();

        assert!(m.data().iter().all(|v| (0.0..1.0).contains(v)));
        assert!(Matrix::random_uniform(2, 2, 1.0, 1.0, &mut rng).is_err());
    }

    #[test]
    fn test_random_normal_is_seeded() {
        let left = Matrix::random_normal(3, 3, 0.0, 1.0, &mut StdRng::seed_from_u64(42)).unwrap();
        let right = Matrix::random_normal(3, 3, 0.0, 1.0, &mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(left, right);
        assert!(Matrix::random_normal(2, 2, 0.0, 0.0, &mut StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn test_add_row_and_column_sums() {
        let mut m = Matrix::zeros(3, 2).unwrap();
        m.add_row(&[1.0, 2.0]).unwrap();

        assert_eq!(m.column_sums(), vec![3.0, 6.0]);
        assert!(m.add_row(&[1.0]).is_err());
    }

    #[test]
    fn test_add_scaled_and_sub() {
        let mut a = Matrix::from_vec(1, 2, vec![1.0, 1.0]).unwrap();
        let b = Matrix::from_vec(1, 2, vec![2.0, 4.0]).unwrap();

        a.add_scaled(&b, 0.5).unwrap();
        assert_eq!(a.data(), &[2.0, 3.0]);

        let d = b.sub(&a).unwrap();
        assert_eq!(d.data(), &[0.0, 1.0]);
    }

    #[test]
    fn test_mean_and_mean_square() {
        let m = Matrix::from_vec(2, 2, vec![1.0, -1.0, 2.0, -2.0]).unwrap();
        assert_eq!(m.mean(), 0.0);
        assert_eq!(m.mean_square(), 2.5);
    }
}
