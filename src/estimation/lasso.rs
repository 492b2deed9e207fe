use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::params::{ParameterBounds, ParameterVector, PARAMETER_NAMES};
use crate::model::series::ObservedSeries;
use crate::optim::bounded::{BoundedMinimizer, MinimizerStatus, Objective, ProjectedBfgs};

const ILL_CONDITIONED: f64 = 1e12;

/// Second derivatives of one QMLE term
/// `ln(sigma*X^gamma) + r^2 / (2 dt sigma^2 X^(2 gamma))`, `r = dX - (alpha + beta X) dt`.
pub fn step_hessian(theta: &ParameterVector, x: f64, dx: f64, dt: f64) -> Matrix4<f64> {
    let ParameterVector {
        alpha,
        beta,
        sigma,
        gamma,
    } = *theta;
    let e = x.powf(-2.0 * gamma);
    let ln_x = x.ln();
    let r = dx - dt * (alpha + beta * x);
    let s2 = sigma.powi(-2);
    let s3 = sigma.powi(-3);

    let h00 = dt * e * s2;
    let h01 = dt * x * e * s2;
    let h02 = 2.0 * r * e * s3;
    let h03 = 2.0 * r * ln_x * e * s2;
    let h11 = dt * x * x * e * s2;
    let h12 = 2.0 * r * x * e * s3;
    let h13 = 2.0 * r * x * ln_x * e * s2;
    let h22 = -s2 + 3.0 * r * r * e * sigma.powi(-4) / dt;
    let h23 = 2.0 * r * r * ln_x * e * s3 / dt;
    let h33 = 2.0 * r * r * ln_x * ln_x * e * s2 / dt;

    Matrix4::new(
        h00, h01, h02, h03, //
        h01, h11, h12, h13, //
        h02, h12, h22, h23, //
        h03, h13, h23, h33,
    )
}

/// Sum of [`step_hessian`] over every transition of the series.
pub fn aggregate_hessian(series: &ObservedSeries, theta: &ParameterVector) -> Matrix4<f64> {
    series
        .transitions()
        .fold(Matrix4::zeros(), |acc, (x, dx)| {
            acc + step_hessian(theta, x, dx, series.dt())
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LassoPenalty {
    pub penalties: [f64; 4],
    pub delta: [f64; 4],
}

impl Default for LassoPenalty {
    fn default() -> Self {
        Self {
            penalties: [0.0; 4],
            delta: [1.0; 4],
        }
    }
}

/// `w_j = penalty_j * |reference_j|^(-delta_j)`.
///
/// A zero penalty always yields a zero weight. A zero reference with a
/// positive penalty yields `+inf`: the coordinate is pinned at zero.
pub fn adaptive_weights(reference: &ParameterVector, penalty: &LassoPenalty) -> [f64; 4] {
    let r = reference.to_array();
    let mut w = [0.0; 4];
    for j in 0..4 {
        let p = penalty.penalties[j];
        if p == 0.0 {
            continue;
        }
        w[j] = if r[j] == 0.0 {
            f64::INFINITY
        } else {
            p * r[j].abs().powf(-penalty.delta[j])
        };
    }
    w
}

/// `(theta - ref)^T H (theta - ref) + sum_j w_j |theta_j|`.
#[derive(Debug, Clone, Copy)]
pub struct LassoObjective {
    reference: Vector4<f64>,
    hessian: Matrix4<f64>,
    weights: [f64; 4],
}

impl LassoObjective {
    pub fn new(reference: &ParameterVector, hessian: Matrix4<f64>, weights: [f64; 4]) -> Self {
        Self {
            reference: Vector4::from(reference.to_array()),
            hessian,
            weights,
        }
    }
}

impl Objective for LassoObjective {
    fn value(&self, theta: &[f64]) -> f64 {
        let t = Vector4::from_column_slice(theta);
        let d = t - self.reference;
        let penalty: f64 = (0..4).map(|j| self.weights[j] * t[j].abs()).sum();
        d.dot(&(self.hessian * d)) + penalty
    }

    /// Minimum-norm subgradient: at `theta_j = 0` the L1 kink absorbs up to
    /// `w_j` of the smooth slope.
    fn gradient(&self, theta: &[f64]) -> Vec<f64> {
        let t = Vector4::from_column_slice(theta);
        let d = t - self.reference;
        let g = (self.hessian + self.hessian.transpose()) * d;
        (0..4)
            .map(|j| {
                let w = self.weights[j];
                if t[j] > 0.0 {
                    g[j] + w
                } else if t[j] < 0.0 {
                    g[j] - w
                } else if g[j].abs() <= w {
                    0.0
                } else {
                    g[j] - w * g[j].signum()
                }
            })
            .collect()
    }

    fn kinked_at_zero(&self, coordinate: usize) -> bool {
        self.weights[coordinate] > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LassoFallback {
    /// Return the refinement failure to the caller.
    Propagate,
    /// Keep the reference estimate when the refinement fails.
    #[default]
    RetainReference,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LassoFit {
    pub theta: ParameterVector,
    pub objective: f64,
    pub iterations: usize,
    pub status: Option<MinimizerStatus>,
    /// `true` when `theta` is the reference kept by the fallback policy.
    pub retained_reference: bool,
    pub condition_number: f64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveLassoEstimator<M = ProjectedBfgs> {
    bounds: ParameterBounds,
    penalty: LassoPenalty,
    fallback: LassoFallback,
    minimizer: M,
}

impl AdaptiveLassoEstimator<ProjectedBfgs> {
    pub fn new(bounds: ParameterBounds, penalty: LassoPenalty, fallback: LassoFallback) -> Self {
        Self::with_minimizer(bounds, penalty, fallback, ProjectedBfgs::default())
    }
}

impl<M: BoundedMinimizer> AdaptiveLassoEstimator<M> {
    pub fn with_minimizer(
        bounds: ParameterBounds,
        penalty: LassoPenalty,
        fallback: LassoFallback,
        minimizer: M,
    ) -> Self {
        Self {
            bounds,
            penalty,
            fallback,
            minimizer,
        }
    }

    pub fn estimate(
        &self,
        series: &ObservedSeries,
        reference: ParameterVector,
        theta0: ParameterVector,
    ) -> Result<LassoFit, CoreError> {
        reference.validate()?;
        let hessian = aggregate_hessian(series, &reference);
        self.estimate_with_hessian(reference, hessian, theta0)
    }

    /// Refinement around `reference` with a precomputed curvature matrix.
    pub fn estimate_with_hessian(
        &self,
        reference: ParameterVector,
        hessian: Matrix4<f64>,
        theta0: ParameterVector,
    ) -> Result<LassoFit, CoreError> {
        let condition_number = condition_number(&hessian);
        match self.refine(reference, hessian, theta0, condition_number) {
            Ok(fit) => Ok(fit),
            Err(err) if self.fallback == LassoFallback::RetainReference && is_recoverable(&err) => {
                tracing::warn!(error = %err, condition_number, "adaptive LASSO failed, keeping reference estimate");
                Ok(LassoFit {
                    theta: reference,
                    objective: 0.0,
                    iterations: 0,
                    status: None,
                    retained_reference: true,
                    condition_number,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn refine(
        &self,
        reference: ParameterVector,
        hessian: Matrix4<f64>,
        theta0: ParameterVector,
        condition_number: f64,
    ) -> Result<LassoFit, CoreError> {
        if hessian.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::DataDegeneracy(
                "LASSO curvature matrix has non-finite entries".to_string(),
            ));
        }
        if !(condition_number < ILL_CONDITIONED) {
            tracing::warn!(condition_number, "LASSO curvature matrix is ill-conditioned");
        }

        let mut weights = adaptive_weights(&reference, &self.penalty);
        let mut lower = self.bounds.lower.to_array();
        let mut upper = self.bounds.upper.to_array();
        for j in 0..4 {
            if weights[j].is_infinite() {
                if lower[j] > 0.0 || upper[j] < 0.0 {
                    return Err(CoreError::DataDegeneracy(format!(
                        "{} is pinned at zero but its box [{}, {}] excludes zero",
                        PARAMETER_NAMES[j], lower[j], upper[j]
                    )));
                }
                lower[j] = 0.0;
                upper[j] = 0.0;
                weights[j] = 0.0;
            }
        }

        let objective = LassoObjective::new(&reference, hessian, weights);
        let start = self.bounds.clamp(theta0).to_array();
        let outcome = self.minimizer.minimize(&objective, &start, &lower, &upper)?;
        let theta = ParameterVector::from_slice(&outcome.x)?;
        if !outcome.converged() {
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
            "adaptive LASSO converged"
        );
        Ok(LassoFit {
            theta,
            objective: outcome.value,
            iterations: outcome.iterations,
            status: Some(outcome.status),
            retained_reference: false,
            condition_number,
        })
    }
}

fn is_recoverable(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::NonConvergence { .. } | CoreError::DataDegeneracy(_)
    )
}

fn condition_number(h: &Matrix4<f64>) -> f64 {
    if h.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }
    let eig = h.symmetric_eigenvalues();
    let max = eig.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let min = eig.iter().fold(f64::INFINITY, |m, v| m.min(v.abs()));
    if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}
