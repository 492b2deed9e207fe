use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::control::{InvestmentDecision, InvestmentDecisionEngine, StochasticMpcController};
use crate::estimation::{AdaptiveLassoEstimator, LassoFit, QmleEstimator, QmleFit};
use crate::market_data::{self, MarketDataSource};
use crate::model::params::ParameterVector;
use crate::model::series::ObservedSeries;
use crate::optim::ProjectedBfgs;
use crate::regime::{ChangePoint, ChangePointDetector};
use crate::simulation::PathSimulator;

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub samples: usize,
    pub last_value: f64,
    pub change_point: ChangePoint,
    pub qmle: QmleFit,
    pub lasso: Option<LassoFit>,
    /// Parameters handed to the simulator.
    pub theta: ParameterVector,
    pub decision: InvestmentDecision,
}

/// Loads the configured window from `source` as an observed series.
pub fn load_series(config: &Config, source: &dyn MarketDataSource) -> Result<ObservedSeries> {
    let data = &config.data;
    let bars = source
        .fetch(&data.ticker)
        .with_context(|| format!("failed to fetch {}", data.ticker))?;
    let window = market_data::slice(&bars, data.start_date, data.end_date)
        .context("failed to select the estimation window")?;
    market_data::to_series(window, data.price_field, data.dt)
        .context("price window is not a valid series")
}

/// Change point, QMLE, optional adaptive LASSO, then the Monte Carlo decision
/// from the last observed value.
pub fn run(config: &Config, series: &ObservedSeries) -> Result<CalibrationReport> {
    let change_point = ChangePointDetector::default()
        .detect(series)
        .context("change point detection failed")?;

    let bounds = config.estimation.bounds()?;
    let minimizer = ProjectedBfgs::new(config.estimation.tolerances);
    let theta0 = config.estimation.initial_guess();
    let qmle = QmleEstimator::with_minimizer(bounds, minimizer)
        .estimate(series, theta0)
        .context("QMLE failed")?;

    let lasso = if config.lasso.enabled {
        let fit = AdaptiveLassoEstimator::with_minimizer(
            bounds,
            config.lasso.penalty(),
            config.lasso.fallback,
            minimizer,
        )
        .estimate(series, qmle.theta, qmle.theta)
        .context("adaptive LASSO failed")?;
        Some(fit)
    } else {
        None
    };
    let theta = lasso.map(|fit| fit.theta).unwrap_or(qmle.theta);

    let simulator = PathSimulator::new(config.simulation)?;
    let controller = StochasticMpcController::new(config.mpc)?;
    let engine = InvestmentDecisionEngine::new(config.decision, simulator, controller)?;
    let decision = engine
        .decide(series.last(), &theta)
        .context("investment decision failed")?;

    Ok(CalibrationReport {
        samples: series.len(),
        last_value: series.last(),
        change_point,
        qmle,
        lasso,
        theta,
        decision,
    })
}
