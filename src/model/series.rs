use serde::Serialize;

use crate::error::CoreError;

/// Samples of a strictly positive process taken every `dt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedSeries {
    values: Vec<f64>,
    dt: f64,
}

impl ObservedSeries {
    pub fn new(values: Vec<f64>, dt: f64) -> Result<Self, CoreError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "sampling interval must be positive, got {dt}"
            )));
        }
        if values.len() < 2 {
            return Err(CoreError::InvalidInput(format!(
                "series needs at least 2 samples, got {}",
                values.len()
            )));
        }
        if let Some((idx, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v > 0.0))
        {
            return Err(CoreError::DataDegeneracy(format!(
                "sample {idx} is {v}; the power-law volatility needs strictly positive values"
            )));
        }
        Ok(Self { values, dt })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// `(X[i], X[i+1] - X[i])` for every transition.
    pub fn transitions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.windows(2).map(|w| (w[0], w[1] - w[0]))
    }
}
