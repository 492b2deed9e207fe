use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const PARAMETER_NAMES: [&str; 4] = ["alpha", "beta", "sigma", "gamma"];

/// CKLS parameters for `dX = (alpha + beta*X) dt + sigma * X^gamma dW`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    pub alpha: f64,
    pub beta: f64,
    pub sigma: f64,
    pub gamma: f64,
}

impl ParameterVector {
    pub fn new(alpha: f64, beta: f64, sigma: f64, gamma: f64) -> Self {
        Self {
            alpha,
            beta,
            sigma,
            gamma,
        }
    }

    pub fn from_array(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn from_slice(v: &[f64]) -> Result<Self, CoreError> {
        match v {
            [a, b, s, g] => Ok(Self::new(*a, *b, *s, *g)),
            _ => Err(CoreError::InvalidInput(format!(
                "parameter vector needs 4 components, got {}",
                v.len()
            ))),
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.alpha, self.beta, self.sigma, self.gamma]
    }

    pub fn drift(&self, x: f64) -> f64 {
        self.alpha + self.beta * x
    }

    pub fn diffusion(&self, x: f64) -> f64 {
        self.sigma * x.powf(self.gamma)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let arr = self.to_array();
        if let Some(i) = arr.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "{} is not finite",
                PARAMETER_NAMES[i]
            )));
        }
        if self.sigma <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Component-wise box `lower <= theta <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: ParameterVector,
    pub upper: ParameterVector,
}

impl ParameterBounds {
    pub fn new(lower: ParameterVector, upper: ParameterVector) -> Result<Self, CoreError> {
        let lo = lower.to_array();
        let hi = upper.to_array();
        for i in 0..4 {
            if !(lo[i] <= hi[i]) {
                return Err(CoreError::InvalidInput(format!(
                    "{} bounds are inverted: [{}, {}]",
                    PARAMETER_NAMES[i], lo[i], hi[i]
                )));
            }
        }
        if lower.sigma <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "sigma lower bound must be positive, got {}",
                lower.sigma
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, theta: &ParameterVector) -> bool {
        let lo = self.lower.to_array();
        let hi = self.upper.to_array();
        theta
            .to_array()
            .iter()
            .enumerate()
            .all(|(i, v)| *v >= lo[i] && *v <= hi[i])
    }

    pub fn clamp(&self, theta: ParameterVector) -> ParameterVector {
        let lo = self.lower.to_array();
        let hi = self.upper.to_array();
        let mut v = theta.to_array();
        for i in 0..4 {
            v[i] = v[i].clamp(lo[i], hi[i]);
        }
        ParameterVector::from_array(v)
    }
}
