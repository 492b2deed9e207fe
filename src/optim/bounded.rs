use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
/// A tiny full quasi-Newton step only counts when the projected gradient is
/// within this multiple of `gradient_tol`.
const STEP_GRADIENT_SLACK: f64 = 10.0;

pub trait Objective: Sync {
    fn value(&self, x: &[f64]) -> f64;

    /// Central differences unless overridden with a closed form.
    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut probe = x.to_vec();
        let mut grad = vec![0.0; x.len()];
        for j in 0..x.len() {
            let h = 1e-6 * x[j].abs().max(1.0);
            probe[j] = x[j] + h;
            let up = self.value(&probe);
            probe[j] = x[j] - h;
            let down = self.value(&probe);
            probe[j] = x[j];
            grad[j] = (up - down) / (2.0 * h);
        }
        grad
    }

    /// `true` when the objective has an L1 kink at zero along `coordinate`.
    /// Such a coordinate stops at zero instead of crossing it within a step,
    /// and `gradient` must return the minimum-norm subgradient there.
    fn kinked_at_zero(&self, _coordinate: usize) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub max_iterations: usize,
    /// Sup norm of the projected gradient.
    pub gradient_tol: f64,
    /// Sup norm of a full quasi-Newton step, relative to `1 + |x|`.
    pub step_tol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tol: 1e-6,
            step_tol: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimizerStatus {
    GradientTolerance,
    StepTolerance,
    /// Steepest descent finds no representable decrease and the projected
    /// gradient is below `gradient_tol * (1 + |f|)`.
    FunctionTolerance,
    MaxIterations,
    LineSearchFailed,
}

impl MinimizerStatus {
    pub fn converged(self) -> bool {
        matches!(
            self,
            Self::GradientTolerance | Self::StepTolerance | Self::FunctionTolerance
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MinimizerOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub status: MinimizerStatus,
}

impl MinimizerOutcome {
    pub fn converged(&self) -> bool {
        self.status.converged()
    }
}

/// Box-constrained minimization of a smooth objective.
pub trait BoundedMinimizer {
    fn minimize(
        &self,
        objective: &dyn Objective,
        x0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<MinimizerOutcome, CoreError>;
}

/// Quasi-Newton (BFGS inverse update) with projection onto the box and an
/// Armijo backtracking search along the projected path.
///
/// Kinked coordinates follow an orthant rule: a coordinate leaving zero moves
/// against its subgradient, and a step that would flip its sign stops at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectedBfgs {
    pub tolerances: Tolerances,
}

/// Accepted line-search point: position, value and number of halvings.
struct Accepted {
    x: DVector<f64>,
    value: f64,
    backtracks: usize,
}

impl ProjectedBfgs {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    #[allow(clippy::too_many_arguments)]
    fn line_search(
        objective: &dyn Objective,
        x: &DVector<f64>,
        f: f64,
        grad: &DVector<f64>,
        direction: &DVector<f64>,
        orthant: &DVector<f64>,
        lower: &[f64],
        upper: &[f64],
    ) -> Option<Accepted> {
        let mut t = 1.0;
        for backtracks in 0..MAX_BACKTRACKS {
            let mut candidate = project(&(x + direction * t), lower, upper);
            for j in 0..candidate.len() {
                if candidate[j] * orthant[j] < 0.0 {
                    candidate[j] = 0.0;
                }
            }
            let step = &candidate - x;
            if step.amax() == 0.0 {
                return None;
            }
            let f_new = objective.value(candidate.as_slice());
            if f_new.is_finite() && f_new <= f + ARMIJO_C1 * grad.dot(&step) {
                return Some(Accepted {
                    x: candidate,
                    value: f_new,
                    backtracks,
                });
            }
            t *= 0.5;
        }
        None
    }
}

impl BoundedMinimizer for ProjectedBfgs {
    fn minimize(
        &self,
        objective: &dyn Objective,
        x0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<MinimizerOutcome, CoreError> {
        let n = x0.len();
        if n == 0 || lower.len() != n || upper.len() != n {
            return Err(CoreError::InvalidInput(format!(
                "dimension mismatch: x0 {n}, lower {}, upper {}",
                lower.len(),
                upper.len()
            )));
        }
        if let Some(j) = (0..n).find(|&j| !(lower[j] <= upper[j])) {
            return Err(CoreError::InvalidInput(format!(
                "bounds of coordinate {j} are inverted: [{}, {}]",
                lower[j], upper[j]
            )));
        }

        let tol = self.tolerances;
        let kinked: Vec<bool> = (0..n).map(|j| objective.kinked_at_zero(j)).collect();
        let identity = DMatrix::<f64>::identity(n, n);
        let mut x = project(&DVector::from_column_slice(x0), lower, upper);
        let mut f = objective.value(x.as_slice());
        if !f.is_finite() {
            return Err(CoreError::DataDegeneracy(format!(
                "objective is {f} at the starting point"
            )));
        }
        let mut grad = DVector::from_vec(objective.gradient(x.as_slice()));
        let mut h_inv = identity.clone();
        let mut fresh = true;

        let outcome = |x: &DVector<f64>, f: f64, iterations: usize, status| MinimizerOutcome {
            x: x.as_slice().to_vec(),
            value: f,
            iterations,
            status,
        };

        for iter in 0..tol.max_iterations {
            let pg = projected_gradient(&x, &grad, lower, upper);
            if pg.amax() <= tol.gradient_tol {
                return Ok(outcome(&x, f, iter, MinimizerStatus::GradientTolerance));
            }

            // Sign each kinked coordinate may take during this step; zero elsewhere.
            let orthant = DVector::from_iterator(
                n,
                (0..n).map(|j| match (kinked[j], x[j] == 0.0) {
                    (false, _) => 0.0,
                    (true, false) => sign(x[j]),
                    (true, true) => -sign(pg[j]),
                }),
            );

            let mut direction = -(&h_inv * &grad);
            for j in 0..n {
                let leaves_zero_uphill =
                    kinked[j] && x[j] == 0.0 && direction[j] * pg[j] >= 0.0;
                if pg[j] == 0.0 || leaves_zero_uphill {
                    direction[j] = 0.0;
                }
            }
            if direction.dot(&grad) >= 0.0 {
                h_inv.copy_from(&identity);
                fresh = true;
                direction = -pg.clone();
            }
            let quasi_newton = !fresh;
            if fresh {
                let scale = direction.amax().max(1.0);
                direction /= scale;
            }

            let Some(accepted) = Self::line_search(
                objective, &x, f, &grad, &direction, &orthant, lower, upper,
            ) else {
                if fresh {
                    let status = if pg.amax() <= tol.gradient_tol * (1.0 + f.abs()) {
                        MinimizerStatus::FunctionTolerance
                    } else {
                        MinimizerStatus::LineSearchFailed
                    };
                    return Ok(outcome(&x, f, iter, status));
                }
                h_inv.copy_from(&identity);
                fresh = true;
                continue;
            };

            let grad_new = DVector::from_vec(objective.gradient(accepted.x.as_slice()));
            let s = &accepted.x - &x;
            let y = &grad_new - &grad;
            x = accepted.x;
            f = accepted.value;
            grad = grad_new;

            // Backtracked or steepest-descent steps say nothing about distance
            // to the optimum on an ill-conditioned objective.
            let full_step = quasi_newton && accepted.backtracks == 0;
            if full_step
                && s.amax() <= tol.step_tol * (1.0 + x.amax())
                && projected_gradient(&x, &grad, lower, upper).amax()
                    <= STEP_GRADIENT_SLACK * tol.gradient_tol
            {
                return Ok(outcome(&x, f, iter + 1, MinimizerStatus::StepTolerance));
            }

            let sy = s.dot(&y);
            if sy > f64::EPSILON * s.norm() * y.norm() {
                if fresh {
                    h_inv = &identity * (sy / y.dot(&y));
                    fresh = false;
                }
                let rho = 1.0 / sy;
                let left = &identity - (&s * y.transpose()) * rho;
                let right = &identity - (&y * s.transpose()) * rho;
                h_inv = &left * &h_inv * &right + (&s * s.transpose()) * rho;
            }
        }

        Ok(outcome(
            &x,
            f,
            tol.max_iterations,
            MinimizerStatus::MaxIterations,
        ))
    }
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn project(x: &DVector<f64>, lower: &[f64], upper: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter()
            .enumerate()
            .map(|(j, v)| v.clamp(lower[j], upper[j])),
    )
}

/// Gradient with components zeroed where the box blocks descent.
pub fn projected_gradient(
    x: &DVector<f64>,
    grad: &DVector<f64>,
    lower: &[f64],
    upper: &[f64],
) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        (0..x.len()).map(|j| {
            let g = grad[j];
            if (x[j] <= lower[j] && g > 0.0) || (x[j] >= upper[j] && g < 0.0) {
                0.0
            } else {
                g
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rosenbrock;

    impl Objective for Rosenbrock {
        fn value(&self, x: &[f64]) -> f64 {
            (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
        }
    }

    struct Bowl;

    impl Objective for Bowl {
        fn value(&self, x: &[f64]) -> f64 {
            (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2)
        }

        fn gradient(&self, x: &[f64]) -> Vec<f64> {
            vec![2.0 * (x[0] - 3.0), 20.0 * (x[1] + 1.0)]
        }
    }

    #[test]
    fn unconstrained_rosenbrock_reaches_minimum() {
        let solver = ProjectedBfgs::new(Tolerances {
            max_iterations: 500,
            gradient_tol: 1e-8,
            step_tol: 1e-10,
        });
        let out = solver
            .minimize(&Rosenbrock, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0])
            .unwrap();
        assert_ne!(out.status, MinimizerStatus::MaxIterations);
        assert!((out.x[0] - 1.0).abs() < 1e-3);
        assert!((out.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn active_bound_stops_at_the_box_edge() {
        let out = ProjectedBfgs::default()
            .minimize(&Bowl, &[0.0, 0.0], &[-10.0, 0.0], &[2.0, 10.0])
            .unwrap();
        assert!(out.converged());
        assert!((out.x[0] - 2.0).abs() < 1e-9);
        assert!(out.x[1].abs() < 1e-9);
    }

    /// `0.5 * (x - 0.05)^2 + |x|`, minimized exactly at zero.
    struct Shrunk;

    impl Objective for Shrunk {
        fn value(&self, x: &[f64]) -> f64 {
            0.5 * (x[0] - 0.05).powi(2) + x[0].abs()
        }

        fn gradient(&self, x: &[f64]) -> Vec<f64> {
            let smooth = x[0] - 0.05;
            let g = if x[0] > 0.0 {
                smooth + 1.0
            } else if x[0] < 0.0 {
                smooth - 1.0
            } else if smooth.abs() <= 1.0 {
                0.0
            } else {
                smooth - smooth.signum()
            };
            vec![g]
        }

        fn kinked_at_zero(&self, _coordinate: usize) -> bool {
            true
        }
    }

    #[test]
    /// A kinked coordinate stops exactly at zero instead of oscillating around it.
    fn kinked_coordinate_lands_on_zero() {
        for start in [0.8, -0.6] {
            let out = ProjectedBfgs::default()
                .minimize(&Shrunk, &[start], &[-1.0], &[1.0])
                .unwrap();
            assert!(out.converged(), "{:?}", out.status);
            assert_eq!(out.x[0], 0.0);
        }
    }

    #[test]
    /// Starting at zero with a small pull, the coordinate never leaves zero.
    fn kinked_coordinate_stays_at_zero() {
        let out = ProjectedBfgs::default()
            .minimize(&Shrunk, &[0.0], &[-1.0], &[1.0])
            .unwrap();
        assert_eq!(out.status, MinimizerStatus::GradientTolerance);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x[0], 0.0);
    }

    #[test]
    /// A cap of one iteration reports `MaxIterations` rather than a false convergence.
    fn iteration_cap_is_not_convergence() {
        let solver = ProjectedBfgs::new(Tolerances {
            max_iterations: 1,
            ..Tolerances::default()
        });
        let out = solver
            .minimize(&Rosenbrock, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0])
            .unwrap();
        assert_eq!(out.status, MinimizerStatus::MaxIterations);
        assert!(!out.converged());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = ProjectedBfgs::default().minimize(&Bowl, &[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]);
        assert!(matches!(err, Err(CoreError::InvalidInput(_))));
    }
}
