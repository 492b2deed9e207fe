use serde::Serialize;

use crate::error::CoreError;
use crate::model::series::ObservedSeries;
use crate::regime::drift::NonParametricDriftEstimator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangePoint {
    /// `k0`, in `[1, n - 2]`.
    pub index: usize,
    /// Average squared standardized residual before `k0`.
    pub pre_energy: f64,
    pub post_energy: f64,
    /// `D[k0 - 1]`.
    pub statistic: f64,
}

/// `Z[i] = (X[i+1] - X[i] - drift[i]*dt) / sqrt(dt)`.
pub fn standardized_residuals(series: &ObservedSeries, drift: &[f64]) -> Result<Vec<f64>, CoreError> {
    let m = series.len() - 1;
    if drift.len() != m {
        return Err(CoreError::InvalidInput(format!(
            "drift has {} values for {m} transitions",
            drift.len()
        )));
    }
    let dt = series.dt();
    let sqrt_dt = dt.sqrt();
    Ok(series
        .transitions()
        .zip(drift)
        .map(|((_, dx), mu)| (dx - mu * dt) / sqrt_dt)
        .collect())
}

/// CUSUM-of-squares change point on the residuals of a non-parametric drift.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangePointDetector {
    drift: NonParametricDriftEstimator,
}

impl ChangePointDetector {
    pub fn new(drift: NonParametricDriftEstimator) -> Self {
        Self { drift }
    }

    pub fn detect(&self, series: &ObservedSeries) -> Result<ChangePoint, CoreError> {
        let estimate = self.drift.estimate(series)?;
        let z = standardized_residuals(series, &estimate.drift)?;
        let cp = Self::detect_from_residuals(&z)?;
        tracing::info!(
            index = cp.index,
            pre_energy = cp.pre_energy,
            post_energy = cp.post_energy,
            "change point located"
        );
        Ok(cp)
    }

    /// Locates `argmax D[i]`, `D[i] = i/m - S[i]/Sn` with `S[i] = sum(Z[0..i]^2)`.
    ///
    /// Ties keep the first index. The scan stops at `m - 2` so both segments
    /// are non-empty.
    pub fn detect_from_residuals(z: &[f64]) -> Result<ChangePoint, CoreError> {
        let m = z.len();
        if m < 2 {
            return Err(CoreError::DataDegeneracy(format!(
                "change point needs at least 2 residuals, got {m}"
            )));
        }
        let mut cumulative = Vec::with_capacity(m + 1);
        cumulative.push(0.0);
        for v in z {
            let last = cumulative[cumulative.len() - 1];
            cumulative.push(last + v * v);
        }
        let total = cumulative[m];
        if !(total.is_finite() && total > 0.0) {
            return Err(CoreError::DataDegeneracy(format!(
                "residual energy is {total}; nothing to split"
            )));
        }

        let mut max_d = 0.0;
        let mut argmax = 0;
        for i in 1..m - 1 {
            let d = i as f64 / m as f64 - cumulative[i] / total;
            if max_d < d {
                max_d = d;
                argmax = i;
            }
        }

        let k0 = argmax + 1;
        Ok(ChangePoint {
            index: k0,
            pre_energy: cumulative[k0] / k0 as f64,
            post_energy: cumulative[m - k0] / (m - k0) as f64,
            statistic: max_d,
        })
    }
}
