use serde::Serialize;

use crate::error::CoreError;

const FEASIBILITY_TOL: f64 = 1e-9;

/// `coefficient * u <= rhs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearConstraint {
    pub coefficient: f64,
    pub rhs: f64,
}

/// Maximize `constant + linear*u - 0.5*curvature*u^2` over a scalar `u`
/// subject to `lower <= u <= upper` and every linear constraint.
///
/// This is the condensed form of a program whose state variables are affine
/// in `u`: the equality constraints have been substituted forward and only
/// the inequalities remain.
#[derive(Debug, Clone, Default)]
pub struct ScalarProgram {
    pub constant: f64,
    pub linear: f64,
    pub curvature: f64,
    pub lower: f64,
    pub upper: f64,
    pub constraints: Vec<LinearConstraint>,
}

impl ScalarProgram {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            ..Self::default()
        }
    }

    pub fn push(&mut self, coefficient: f64, rhs: f64) {
        self.constraints.push(LinearConstraint { coefficient, rhs });
    }

    pub fn objective(&self, u: f64) -> f64 {
        self.constant + self.linear * u - 0.5 * self.curvature * u * u
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Stationary point strictly inside the feasible interval.
    Interior,
    /// Optimum sits on a constraint.
    Bound,
    /// The feasible set is a single point.
    Degenerate,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScalarSolution {
    pub u: f64,
    pub objective: f64,
    pub feasible_lower: f64,
    pub feasible_upper: f64,
    pub status: SolveStatus,
}

pub trait ConstrainedSolver: Sync {
    fn solve(&self, program: &ScalarProgram) -> Result<ScalarSolution, CoreError>;
}

/// Exact solver: intersects the half-lines into one interval and clamps the
/// stationary point of the concave objective into it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalSolver;

impl IntervalSolver {
    fn feasible_interval(program: &ScalarProgram) -> Result<(f64, f64), CoreError> {
        let mut lo = program.lower;
        let mut hi = program.upper;
        for (idx, c) in program.constraints.iter().enumerate() {
            if !(c.coefficient.is_finite() && c.rhs.is_finite()) {
                return Err(CoreError::InvalidInput(format!(
                    "constraint {idx} is not finite: {} * u <= {}",
                    c.coefficient, c.rhs
                )));
            }
            let scale = c.rhs.abs().max(1.0);
            if c.coefficient.abs() <= f64::EPSILON * scale {
                if c.rhs < -FEASIBILITY_TOL * scale {
                    return Err(CoreError::InfeasibleConstraints(format!(
                        "constraint {idx} requires 0 <= {}",
                        c.rhs
                    )));
                }
                continue;
            }
            let bound = c.rhs / c.coefficient;
            if c.coefficient > 0.0 {
                hi = hi.min(bound);
            } else {
                lo = lo.max(bound);
            }
        }
        if lo > hi {
            if lo - hi <= FEASIBILITY_TOL * lo.abs().max(hi.abs()).max(1.0) {
                let mid = 0.5 * (lo + hi);
                return Ok((mid, mid));
            }
            return Err(CoreError::InfeasibleConstraints(format!(
                "no control satisfies all constraints: lower {lo} > upper {hi}"
            )));
        }
        Ok((lo, hi))
    }
}

impl ConstrainedSolver for IntervalSolver {
    fn solve(&self, program: &ScalarProgram) -> Result<ScalarSolution, CoreError> {
        let (lo, hi) = Self::feasible_interval(program)?;
        let solution = |u: f64, status| ScalarSolution {
            u,
            objective: program.objective(u),
            feasible_lower: lo,
            feasible_upper: hi,
            status,
        };

        if lo.is_finite()
            && hi.is_finite()
            && hi - lo <= FEASIBILITY_TOL * lo.abs().max(hi.abs()).max(1.0)
        {
            return Ok(solution(0.5 * (lo + hi), SolveStatus::Degenerate));
        }

        if program.curvature > 0.0 {
            let stationary = program.linear / program.curvature;
            if stationary > lo && stationary < hi {
                return Ok(solution(stationary, SolveStatus::Interior));
            }
            if stationary.is_finite() {
                return Ok(solution(stationary.clamp(lo, hi), SolveStatus::Bound));
            }
        }

        // Linear objective: optimum at the end the slope points to.
        let u = if program.linear > 0.0 {
            hi
        } else if program.linear < 0.0 {
            lo
        } else {
            0.0_f64.clamp(lo, hi)
        };
        if !u.is_finite() {
            return Err(CoreError::Unbounded(format!(
                "objective grows without bound over [{lo}, {hi}]"
            )));
        }
        let status = if u == lo || u == hi {
            SolveStatus::Bound
        } else {
            SolveStatus::Interior
        };
        Ok(solution(u, status))
    }
}
