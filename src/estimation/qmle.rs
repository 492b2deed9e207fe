use serde::Serialize;

use crate::error::CoreError;
use crate::model::params::{ParameterBounds, ParameterVector};
use crate::model::series::ObservedSeries;
use crate::optim::bounded::{BoundedMinimizer, MinimizerStatus, Objective, ProjectedBfgs};

/// Negative Gaussian quasi-log-likelihood of the Euler transition density,
/// up to an additive constant.
#[derive(Debug, Clone, Copy)]
pub struct QmleObjective<'a> {
    series: &'a ObservedSeries,
}

impl<'a> QmleObjective<'a> {
    pub fn new(series: &'a ObservedSeries) -> Self {
        Self { series }
    }
}

impl Objective for QmleObjective<'_> {
    fn value(&self, theta: &[f64]) -> f64 {
        let [alpha, beta, sigma, gamma] = [theta[0], theta[1], theta[2], theta[3]];
        if sigma <= 0.0 {
            return f64::INFINITY;
        }
        let dt = self.series.dt();
        let mut total = 0.0;
        for (x, dx) in self.series.transitions() {
            let scale = sigma * x.powf(gamma);
            let r = dx - (alpha + beta * x) * dt;
            total += 2.0 * scale.ln() + r * r / (dt * scale * scale);
        }
        total / 2.0
    }

    fn gradient(&self, theta: &[f64]) -> Vec<f64> {
        let [alpha, beta, sigma, gamma] = [theta[0], theta[1], theta[2], theta[3]];
        let dt = self.series.dt();
        let mut g = [0.0; 4];
        for (x, dx) in self.series.transitions() {
            let w = 1.0 / (sigma * sigma * x.powf(2.0 * gamma));
            let r = dx - (alpha + beta * x) * dt;
            let q = r * r * w / dt;
            g[0] -= r * w;
            g[1] -= r * w * x;
            g[2] += (1.0 - q) / sigma;
            g[3] += x.ln() * (1.0 - q);
        }
        g.to_vec()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QmleFit {
    pub theta: ParameterVector,
    pub objective: f64,
    pub iterations: usize,
    pub status: MinimizerStatus,
}

#[derive(Debug, Clone)]
pub struct QmleEstimator<M = ProjectedBfgs> {
    bounds: ParameterBounds,
    minimizer: M,
}

impl QmleEstimator<ProjectedBfgs> {
    pub fn new(bounds: ParameterBounds) -> Self {
        Self::with_minimizer(bounds, ProjectedBfgs::default())
    }
}

impl<M: BoundedMinimizer> QmleEstimator<M> {
    pub fn with_minimizer(bounds: ParameterBounds, minimizer: M) -> Self {
        Self { bounds, minimizer }
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    /// Fits theta starting from `theta0`. Running out of iterations is an
    /// error carrying the best point found.
    pub fn estimate(
        &self,
        series: &ObservedSeries,
        theta0: ParameterVector,
    ) -> Result<QmleFit, CoreError> {
        let objective = QmleObjective::new(series);
        let start = self.bounds.clamp(theta0);
        let outcome = self.minimizer.minimize(
            &objective,
            &start.to_array(),
            &self.bounds.lower.to_array(),
            &self.bounds.upper.to_array(),
        )?;
        let theta = ParameterVector::from_slice(&outcome.x)?;
        if !outcome.converged() {
            tracing::warn!(
                iterations = outcome.iterations,
                status = ?outcome.status,
                objective = outcome.value,
                "QMLE did not converge"
            );
            return Err(CoreError::NonConvergence {
                iterations: outcome.iterations,
                objective: outcome.value,
                best: theta,
            });
        }
        tracing::info!(
            alpha = theta.alpha,
            beta = theta.beta,
            sigma = theta.sigma,
            gamma = theta.gamma,
            iterations = outcome.iterations,
            "QMLE converged"
        );
        Ok(QmleFit {
            theta,
            objective: outcome.value,
            iterations: outcome.iterations,
            status: outcome.status,
        })
    }
}
