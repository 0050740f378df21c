#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// Multivariate Gaussian with a diagonal covariance, parameterized by a
/// mean and a strictly positive standard deviation of identical shape.
/// Reductions (entropy, KL) run over the last dimension, so the leading
/// dimensions can be any mix of batch and time.
#[derive(Clone, Debug)]
pub struct DiagonalGaussian {
    mean: Tensor,
    stddev: Tensor,
}

impl DiagonalGaussian {
    /// Shape mismatch between mean and standard deviation is a
    /// programmer error and fails construction; no silent broadcasting.
    pub fn new(mean: Tensor, stddev: Tensor) -> Result<Self> {
        if mean.shape() != stddev.shape() {
            candle_core::bail!(
                "mean/stddev shape mismatch: {:?} vs {:?}",
                mean.shape(),
                stddev.shape()
            );
        }
        Ok(Self { mean, stddev })
    }

    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    pub fn stddev(&self) -> &Tensor {
        &self.stddev
    }

    pub fn dim(&self) -> usize {
        self.mean.dims()[self.mean.rank() - 1]
    }

    ///
    /// z = mu + sigma * eps, eps ~ N(0, I)
    ///
    /// The sample stays differentiable through both parameters.
    pub fn sample(&self) -> Result<Tensor> {
        let eps = Tensor::randn_like(&self.mean, 0., 1.)?;
        &self.mean + self.stddev.mul(&eps)?
    }

    /// Closed-form differential entropy, summed over the last dimension:
    /// 0.5 * sum_k (1 + log(2 pi) + 2 log sigma_k)
    pub fn entropy(&self) -> Result<Tensor> {
        let k = self.dim() as f64;
        let c = 0.5 * (1.0 + (2.0 * std::f64::consts::PI).ln());
        self.stddev
            .log()?
            .sum(self.mean.rank() - 1)?
            .affine(1.0, c * k)
    }

    /// Analytic KL divergence to another diagonal Gaussian, summed over
    /// the last dimension:
    ///
    /// KL(p||q) = sum_k log(sq/sp) + (sp^2 + (mp - mq)^2) / (2 sq^2) - 1/2
    ///
    /// Satisfies KL(p||p) = 0 and KL >= 0 for any valid parameters.
    pub fn kl_divergence(&self, other: &Self) -> Result<Tensor> {
        if self.mean.shape() != other.mean.shape() {
            candle_core::bail!(
                "kl_divergence shape mismatch: {:?} vs {:?}",
                self.mean.shape(),
                other.mean.shape()
            );
        }

        let log_ratio = other.stddev.log()?.sub(&self.stddev.log()?)?;
        let var_p = self.stddev.powf(2.)?;
        let delta2 = self.mean.sub(&other.mean)?.powf(2.)?;
        let scaled = var_p.add(&delta2)?.div(&(other.stddev.powf(2.)? * 2.)?)?;

        log_ratio
            .add(&scaled)?
            .affine(1.0, -0.5)?
            .sum(self.mean.rank() - 1)
    }

    /// The N(0, I) prior with matching shape
    pub fn standard_like(&self) -> Result<Self> {
        Self::new(self.mean.zeros_like()?, self.stddev.ones_like()?)
    }
}
