use serde::{Deserialize, Serialize};

use crate::control::account::AccountTrajectories;
use crate::error::CoreError;
use crate::optim::constrained::{ConstrainedSolver, IntervalSolver, ScalarProgram, SolveStatus};
use crate::simulation::SimulationEnsemble;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
    Both,
}

impl TradeDirection {
    /// `l`/`long` and `s`/`short`; anything else allows both sides.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "long" => Self::Long,
            "s" | "short" => Self::Short,
            _ => Self::Both,
        }
    }

    fn control_range(self) -> (f64, f64) {
        match self {
            Self::Long => (0.0, f64::INFINITY),
            Self::Short => (f64::NEG_INFINITY, 0.0),
            Self::Both => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }
}

fn default_solvency_floor() -> f64 {
    100.0
}

fn default_control_decimals() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MpcConfig {
    pub initial_account_value: f64,
    /// Per-step risk-free growth, `V` grows by `1 + risk_free_rate`.
    pub risk_free_rate: f64,
    pub risk_aversion: f64,
    /// Largest `|u * S| / V` allowed at any step.
    pub leverage_limit: f64,
    #[serde(default = "default_solvency_floor")]
    pub solvency_floor: f64,
    #[serde(default = "default_control_decimals")]
    pub control_decimals: u32,
}

impl MpcConfig {
    pub fn new(
        initial_account_value: f64,
        risk_free_rate: f64,
        risk_aversion: f64,
        leverage_limit: f64,
    ) -> Self {
        Self {
            initial_account_value,
            risk_free_rate,
            risk_aversion,
            leverage_limit,
            solvency_floor: default_solvency_floor(),
            control_decimals: default_control_decimals(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.initial_account_value.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "initial account value is {}",
                self.initial_account_value
            )));
        }
        if !(self.risk_free_rate.is_finite() && self.risk_free_rate > -1.0) {
            return Err(CoreError::InvalidInput(format!(
                "risk-free rate must exceed -1, got {}",
                self.risk_free_rate
            )));
        }
        if !(self.risk_aversion.is_finite() && self.risk_aversion >= 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "risk aversion must be non-negative, got {}",
                self.risk_aversion
            )));
        }
        if !(self.leverage_limit.is_finite() && self.leverage_limit >= 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "leverage limit must be non-negative, got {}",
                self.leverage_limit
            )));
        }
        if !self.solvency_floor.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "solvency floor is {}",
                self.solvency_floor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MpcSolution {
    /// Position size after rounding, inside the feasible range.
    pub control: f64,
    pub raw_control: f64,
    pub status: SolveStatus,
    pub feasible_range: (f64, f64),
    pub expected_terminal_value: f64,
    pub terminal_variance: f64,
    /// `E[V_T] - (lambda / 2) Var[V_T]` at `control`.
    pub utility: f64,
}

impl MpcSolution {
    /// `false` when the constraints left no room to trade.
    pub fn is_tradable(&self) -> bool {
        self.status != SolveStatus::Degenerate
    }
}

/// Single-control stochastic MPC over a simulated price ensemble.
///
/// Account values are decision variables tied to `u` by the self-financing
/// recursion; they enter the solver after forward substitution, which makes
/// every `V[i, k]` affine in `u` and every constraint a half-line in `u`.
#[derive(Debug, Clone)]
pub struct StochasticMpcController<S = IntervalSolver> {
    cfg: MpcConfig,
    solver: S,
}

impl StochasticMpcController<IntervalSolver> {
    pub fn new(cfg: MpcConfig) -> Result<Self, CoreError> {
        Self::with_solver(cfg, IntervalSolver)
    }
}

impl<S: ConstrainedSolver> StochasticMpcController<S> {
    pub fn with_solver(cfg: MpcConfig, solver: S) -> Result<Self, CoreError> {
        cfg.validate()?;
        Ok(Self { cfg, solver })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.cfg
    }

    pub fn build_program(&self, ensemble: &SimulationEnsemble, direction: TradeDirection) -> ScalarProgram {
        let cfg = &self.cfg;
        let growth = 1.0 + cfg.risk_free_rate;
        let lev = cfg.leverage_limit;
        let horizon = ensemble.steps();

        // Control-free part of V[., k], identical on every path.
        let mut base = Vec::with_capacity(horizon + 1);
        let mut v = cfg.initial_account_value;
        for _ in 0..=horizon {
            base.push(v);
            v *= growth;
        }

        let (lower, upper) = direction.control_range();
        let mut program = ScalarProgram::new(lower, upper);
        let mut terminal_slopes = Vec::with_capacity(ensemble.paths());
        for prices in ensemble.rows() {
            // V[i, k] = base[k] + slope * u
            let mut slope = 0.0;
            for k in 0..=horizon {
                program.push(-slope, base[k] - cfg.solvency_floor);
                if k == horizon {
                    break;
                }
                program.push(prices[k] - lev * slope, lev * base[k]);
                program.push(-prices[k] - lev * slope, lev * base[k]);
                slope = slope * growth + (prices[k + 1] - growth * prices[k]);
            }
            terminal_slopes.push(slope);
        }

        let n = terminal_slopes.len() as f64;
        let mean = terminal_slopes.iter().sum::<f64>() / n;
        let var = terminal_slopes
            .iter()
            .map(|b| (b - mean) * (b - mean))
            .sum::<f64>()
            / n;
        program.constant = base[horizon];
        program.linear = mean;
        program.curvature = cfg.risk_aversion * var;
        program
    }

    pub fn solve(
        &self,
        ensemble: &SimulationEnsemble,
        direction: TradeDirection,
    ) -> Result<MpcSolution, CoreError> {
        let program = self.build_program(ensemble, direction);
        let sol = self.solver.solve(&program)?;
        let control = if sol.status == SolveStatus::Degenerate {
            sol.u
        } else {
            round_within(
                sol.u,
                self.cfg.control_decimals,
                sol.feasible_lower,
                sol.feasible_upper,
            )
        };

        let accounts = AccountTrajectories::compute(
            ensemble,
            self.cfg.initial_account_value,
            self.cfg.risk_free_rate,
            control,
        );
        let expected = accounts.expected_terminal_value();
        let variance = accounts.terminal_variance();
        if sol.status == SolveStatus::Degenerate {
            tracing::warn!(
                control,
                leverage_limit = self.cfg.leverage_limit,
                "MPC feasible set is a single point"
            );
        }
        tracing::debug!(control, status = ?sol.status, expected, "MPC solved");
        Ok(MpcSolution {
            control,
            raw_control: sol.u,
            status: sol.status,
            feasible_range: (sol.feasible_lower, sol.feasible_upper),
            expected_terminal_value: expected,
            terminal_variance: variance,
            utility: expected - 0.5 * self.cfg.risk_aversion * variance,
        })
    }
}

/// Rounds to `decimals`, falling back toward the interior when the nearest
/// grid point leaves `[lo, hi]`.
pub fn round_within(u: f64, decimals: u32, lo: f64, hi: f64) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let mut r = (u * factor).round() / factor;
    if r > hi {
        r = (hi * factor).floor() / factor;
    }
    if r < lo {
        r = (lo * factor).ceil() / factor;
    }
    if r < lo || r > hi {
        u
    } else {
        r
    }
}
