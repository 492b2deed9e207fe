use serde::Serialize;

use crate::error::CoreError;
use crate::model::series::ObservedSeries;
use crate::regime::kernel::KernelSmoother;
use crate::stats::sample_variance;

/// Scott/Silverman rule of thumb: `n^(-1/5) * sd(X)`.
pub fn scott_bandwidth(values: &[f64]) -> Result<f64, CoreError> {
    let n = values.len() as f64;
    let bw = n.powf(-0.2) * sample_variance(values)?.sqrt();
    if !(bw.is_finite() && bw > 0.0) {
        return Err(CoreError::DataDegeneracy(format!(
            "bandwidth collapsed to {bw}; the series is constant"
        )));
    }
    Ok(bw)
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftEstimate {
    pub bandwidth: f64,
    /// One value per transition, `len = n - 1`.
    pub drift: Vec<f64>,
}

/// Local drift from kernel-smoothed empirical increments.
///
/// Every query point is also one of the regressors; this is not a
/// leave-one-out estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonParametricDriftEstimator {
    bandwidth: Option<f64>,
}

impl NonParametricDriftEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed bandwidth instead of the rule of thumb.
    pub fn with_bandwidth(bandwidth: f64) -> Self {
        Self {
            bandwidth: Some(bandwidth),
        }
    }

    pub fn estimate(&self, series: &ObservedSeries) -> Result<DriftEstimate, CoreError> {
        let x = series.values();
        let dt = series.dt();
        let bandwidth = match self.bandwidth {
            Some(bw) => bw,
            None => scott_bandwidth(x)?,
        };
        let increments: Vec<f64> = x.windows(2).map(|w| (w[1] - w[0]) / dt).collect();
        let regressors = &x[..x.len() - 1];
        let smoother = KernelSmoother::new(regressors, &increments, bandwidth)?;
        let drift = regressors
            .iter()
            .map(|xq| smoother.estimate(*xq))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(bandwidth, samples = x.len(), "non-parametric drift estimated");
        Ok(DriftEstimate { bandwidth, drift })
    }
}
