use crate::error::CoreError;
use crate::stats::gaussian_pdf;

/// Nadaraya-Watson regression with a Gaussian kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelSmoother<'a> {
    regressors: &'a [f64],
    targets: &'a [f64],
    bandwidth: f64,
}

impl<'a> KernelSmoother<'a> {
    pub fn new(regressors: &'a [f64], targets: &'a [f64], bandwidth: f64) -> Result<Self, CoreError> {
        if regressors.is_empty() || regressors.len() != targets.len() {
            return Err(CoreError::InvalidInput(format!(
                "kernel smoother needs matching non-empty samples, got {} regressors and {} targets",
                regressors.len(),
                targets.len()
            )));
        }
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(CoreError::DataDegeneracy(format!(
                "kernel bandwidth must be positive, got {bandwidth}"
            )));
        }
        Ok(Self {
            regressors,
            targets,
            bandwidth,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Kernel-weighted average of the targets around `query`.
    pub fn estimate(&self, query: f64) -> Result<f64, CoreError> {
        let mut num = 0.0;
        let mut den = 0.0;
        for (x, y) in self.regressors.iter().zip(self.targets) {
            let w = gaussian_pdf(query, *x, self.bandwidth);
            num += w * y;
            den += w;
        }
        if !(den.is_finite() && den > f64::MIN_POSITIVE) {
            return Err(CoreError::DataDegeneracy(format!(
                "kernel weights vanish at {query} (bandwidth {})",
                self.bandwidth
            )));
        }
        let out = num / den;
        if !out.is_finite() {
            return Err(CoreError::DataDegeneracy(format!(
                "kernel estimate at {query} is not finite"
            )));
        }
        Ok(out)
    }
}
