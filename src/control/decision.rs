use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::control::mpc::{round_within, StochasticMpcController, TradeDirection};
use crate::error::CoreError;
use crate::model::params::ParameterVector;
use crate::optim::constrained::{ConstrainedSolver, IntervalSolver};
use crate::simulation::{PathSimulator, RandomStream, SimulationEnsemble};

fn default_control_decimals() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub iterations: usize,
    /// Percentage of trials that must recommend a long position.
    pub participation_threshold: f64,
    /// Base seed for the per-trial seeds; falls back to the simulator seed.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub skip_failed_trials: bool,
    #[serde(default = "default_control_decimals")]
    pub control_decimals: u32,
}

impl DecisionConfig {
    pub fn new(iterations: usize, participation_threshold: f64) -> Self {
        Self {
            iterations,
            participation_threshold,
            seed: None,
            skip_failed_trials: false,
            control_decimals: default_control_decimals(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentDecision {
    pub run_id: Uuid,
    /// Averaged control, or zero when participation is too low.
    pub control: f64,
    pub controls: Vec<f64>,
    #[serde(skip)]
    pub ensembles: Vec<SimulationEnsemble>,
    /// Share of all requested trials with a strictly positive control, in
    /// percent. Skipped trials count as not participating.
    pub participation_pct: f64,
    /// Trials whose constraints admitted no control, recorded as zero.
    pub infeasible_trials: usize,
    /// Trials dropped under `skip_failed_trials`.
    pub failed_trials: usize,
}

impl InvestmentDecision {
    pub fn invests(&self) -> bool {
        self.control != 0.0
    }
}

struct Trial {
    control: f64,
    ensemble: SimulationEnsemble,
    infeasible: bool,
}

/// Repeats simulate-then-control and commits only when enough trials agree.
#[derive(Debug, Clone)]
pub struct InvestmentDecisionEngine<S = IntervalSolver> {
    cfg: DecisionConfig,
    simulator: PathSimulator,
    controller: StochasticMpcController<S>,
}

impl<S: ConstrainedSolver> InvestmentDecisionEngine<S> {
    pub fn new(
        cfg: DecisionConfig,
        simulator: PathSimulator,
        controller: StochasticMpcController<S>,
    ) -> Result<Self, CoreError> {
        if cfg.iterations == 0 {
            return Err(CoreError::InvalidInput(
                "decision needs at least one trial".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&cfg.participation_threshold) {
            return Err(CoreError::InvalidInput(format!(
                "participation threshold must be a percentage, got {}",
                cfg.participation_threshold
            )));
        }
        Ok(Self {
            cfg,
            simulator,
            controller,
        })
    }

    fn trial_seeds(&self) -> Vec<Option<u64>> {
        match self.cfg.seed.or(self.simulator.config().seed) {
            Some(seed) => {
                let mut stream = RandomStream::new(seed, u64::MAX);
                (0..self.cfg.iterations)
                    .map(|_| Some(stream.next_seed()))
                    .collect()
            }
            None => vec![None; self.cfg.iterations],
        }
    }

    fn run_trial(
        &self,
        x0: f64,
        theta: &ParameterVector,
        seed: Option<u64>,
    ) -> Result<Trial, CoreError> {
        let ensemble = self.simulator.with_seed(seed).simulate(x0, theta)?;
        match self.controller.solve(&ensemble, TradeDirection::Long) {
            Ok(sol) => Ok(Trial {
                control: sol.control,
                ensemble,
                infeasible: false,
            }),
            Err(err) if err.is_infeasible() => {
                tracing::debug!(error = %err, "trial infeasible, recording no trade");
                Ok(Trial {
                    control: 0.0,
                    ensemble,
                    infeasible: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn decide(&self, x0: f64, theta: &ParameterVector) -> Result<InvestmentDecision, CoreError> {
        let run_id = Uuid::new_v4();
        let results: Vec<Result<Trial, CoreError>> = self
            .trial_seeds()
            .into_par_iter()
            .map(|seed| self.run_trial(x0, theta, seed))
            .collect();

        let mut controls = Vec::with_capacity(results.len());
        let mut ensembles = Vec::with_capacity(results.len());
        let mut infeasible_trials = 0;
        let mut failed_trials = 0;
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Ok(trial) => {
                    infeasible_trials += usize::from(trial.infeasible);
                    controls.push(trial.control);
                    ensembles.push(trial.ensemble);
                }
                Err(err) if self.cfg.skip_failed_trials => {
                    tracing::warn!(%run_id, trial = idx, error = %err, "skipping failed trial");
                    failed_trials += 1;
                }
                Err(err) => return Err(err),
            }
        }
        if controls.is_empty() {
            return Err(CoreError::DataDegeneracy(format!(
                "all {} trials failed",
                self.cfg.iterations
            )));
        }

        let participation_pct = participation_pct(&controls, self.cfg.iterations);
        let control = if participation_pct > self.cfg.participation_threshold {
            let mean = controls.iter().sum::<f64>() / controls.len() as f64;
            round_within(
                mean,
                self.cfg.control_decimals,
                f64::NEG_INFINITY,
                f64::INFINITY,
            )
        } else {
            0.0
        };

        tracing::info!(
            %run_id,
            control,
            participation_pct,
            trials = controls.len(),
            infeasible_trials,
            failed_trials,
            "investment decision"
        );
        Ok(InvestmentDecision {
            run_id,
            control,
            controls,
            ensembles,
            participation_pct,
            infeasible_trials,
            failed_trials,
        })
    }
}

fn participation_pct(controls: &[f64], trials: usize) -> f64 {
    let positive = controls.iter().filter(|u| **u > 0.0).count();
    positive as f64 / trials as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Skipped trials stay in the denominator of the participation share.
    fn participation_counts_every_requested_trial() {
        assert!((participation_pct(&[1.0, 0.5, 0.0], 3) - 200.0 / 3.0).abs() < 1e-12);
        assert_eq!(participation_pct(&[1.0, 0.5], 4), 50.0);
        assert_eq!(participation_pct(&[0.0, -0.2], 2), 0.0);
    }
}
