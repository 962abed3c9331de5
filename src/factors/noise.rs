//! Measurement noise models and robust kernels.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Robust loss applied to the whitened residual norm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RobustKernel {
    L2,
    Huber(f64),
    Tukey(f64),
}

impl Default for RobustKernel {
    fn default() -> Self {
        RobustKernel::L2
    }
}

impl RobustKernel {
    /// Loss of a residual with whitened norm `r`. Equals `r²/2` for L2.
    pub fn loss(&self, r: f64) -> f64 {
        let r = r.abs();
        match *self {
            RobustKernel::L2 => 0.5 * r * r,
            RobustKernel::Huber(k) => {
                if r <= k {
                    0.5 * r * r
                } else {
                    k * (r - 0.5 * k)
                }
            }
            RobustKernel::Tukey(c) => {
                let c2 = c * c / 6.0;
                if r <= c {
                    let t = 1.0 - (r / c).powi(2);
                    c2 * (1.0 - t * t * t)
                } else {
                    c2
                }
            }
        }
    }

    /// IRLS weight for a residual with whitened norm `r`.
    pub fn weight(&self, r: f64) -> f64 {
        let r = r.abs();
        match *self {
            RobustKernel::L2 => 1.0,
            RobustKernel::Huber(k) => {
                if r <= k {
                    1.0
                } else {
                    k / r
                }
            }
            RobustKernel::Tukey(c) => {
                if r <= c {
                    let t = 1.0 - (r / c).powi(2);
                    t * t
                } else {
                    0.0
                }
            }
        }
    }
}

/// Diagonal or full Gaussian noise, optionally robustified.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModel {
    /// Upper-triangular square-root information `R` with `Rᵀ R = Σ⁻¹`.
    sqrt_info: DMatrix<f64>,
    pub kernel: RobustKernel,
}

impl NoiseModel {
    pub fn isotropic(dim: usize, sigma: f64) -> Self {
        Self::diagonal(&vec![sigma; dim])
    }

    pub fn diagonal(sigmas: &[f64]) -> Self {
        let inv = DVector::from_iterator(sigmas.len(), sigmas.iter().map(|s| 1.0 / s));
        Self {
            sqrt_info: DMatrix::from_diagonal(&inv),
            kernel: RobustKernel::L2,
        }
    }

    /// Full covariance. Returns `None` if it is not positive definite.
    pub fn from_covariance(covariance: DMatrix<f64>) -> Option<Self> {
        let info = covariance.try_inverse()?;
        let chol = info.cholesky()?;
        Some(Self {
            sqrt_info: chol.l().transpose(),
            kernel: RobustKernel::L2,
        })
    }

    pub fn robust(mut self, kernel: RobustKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn dim(&self) -> usize {
        self.sqrt_info.nrows()
    }

    pub fn whiten(&self, residual: &DVector<f64>) -> DVector<f64> {
        &self.sqrt_info * residual
    }

    /// Robust loss of an unwhitened residual.
    pub fn loss(&self, residual: &DVector<f64>) -> f64 {
        self.kernel.loss(self.whiten(residual).norm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernels_agree_near_zero() {
        for kernel in [RobustKernel::L2, RobustKernel::Huber(1.345), RobustKernel::Tukey(4.685)] {
            assert_relative_eq!(kernel.loss(0.1), 0.005, epsilon = 1e-5);
            assert_relative_eq!(kernel.weight(0.0), 1.0);
        }
    }

    #[test]
    fn test_kernels_bound_outliers() {
        assert_relative_eq!(RobustKernel::Huber(1.0).loss(10.0), 9.5);
        assert_relative_eq!(RobustKernel::Tukey(3.0).loss(10.0), 1.5);
        assert_relative_eq!(RobustKernel::Tukey(3.0).weight(10.0), 0.0);
        assert_relative_eq!(RobustKernel::L2.loss(10.0), 50.0);
    }

    #[test]
    fn test_whitening() {
        let diag = NoiseModel::diagonal(&[0.5, 2.0]);
        let r = DVector::from_vec(vec![1.0, 1.0]);
        assert_relative_eq!(diag.whiten(&r), DVector::from_vec(vec![2.0, 0.5]));

        let full = NoiseModel::from_covariance(DMatrix::from_diagonal(&DVector::from_vec(vec![
            0.25, 4.0,
        ])))
        .unwrap();
        assert_relative_eq!(full.loss(&r), diag.loss(&r), epsilon = 1e-12);
    }
}
