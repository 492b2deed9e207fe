use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::control::{DecisionConfig, MpcConfig};
use crate::estimation::{LassoFallback, LassoPenalty};
use crate::market_data::PriceField;
use crate::model::params::{ParameterBounds, ParameterVector};
use crate::optim::Tolerances;
use crate::simulation::SimulatorConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub lasso: LassoConfig,
    pub simulation: SimulatorConfig,
    pub mpc: MpcConfig,
    pub decision: DecisionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub csv_dir: PathBuf,
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Sampling interval in years, e.g. 1/252 for daily bars.
    pub dt: f64,
    #[serde(default)]
    pub price_field: PriceField,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimationConfig {
    pub theta0: [f64; 4],
    pub theta_min: [f64; 4],
    pub theta_max: [f64; 4],
    #[serde(default)]
    pub tolerances: Tolerances,
}

fn default_delta() -> [f64; 4] {
    [1.0; 4]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LassoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub penalties: [f64; 4],
    #[serde(default = "default_delta")]
    pub delta: [f64; 4],
    #[serde(default)]
    pub fallback: LassoFallback,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            penalties: [0.0; 4],
            delta: default_delta(),
            fallback: LassoFallback::default(),
        }
    }
}

impl LassoConfig {
    pub fn penalty(&self) -> LassoPenalty {
        LassoPenalty {
            penalties: self.penalties,
            delta: self.delta,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl EstimationConfig {
    pub fn bounds(&self) -> Result<ParameterBounds> {
        ParameterBounds::new(
            ParameterVector::from_array(self.theta_min),
            ParameterVector::from_array(self.theta_max),
        )
        .context("estimation bounds are invalid")
    }

    pub fn initial_guess(&self) -> ParameterVector {
        ParameterVector::from_array(self.theta0)
    }
}

impl Config {
    /// Reads `CKLS_MPC_CONFIG` (after `.env`) or `config/default.toml`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("CKLS_MPC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.data.dt.is_finite() && self.data.dt > 0.0) {
            bail!("data.dt must be positive, got {}", self.data.dt);
        }
        if self.data.end_date <= self.data.start_date {
            bail!(
                "data.end_date {} must follow data.start_date {}",
                self.data.end_date,
                self.data.start_date
            );
        }
        if self.data.ticker.trim().is_empty() {
            bail!("data.ticker is empty");
        }
        self.estimation.bounds()?;
        if self.simulation.paths == 0 || self.simulation.horizon == 0 {
            bail!("simulation.paths and simulation.horizon must be > 0");
        }
        if (self.simulation.dt - self.data.dt).abs() > f64::EPSILON {
            tracing::warn!(
                simulation_dt = self.simulation.dt,
                data_dt = self.data.dt,
                "simulation and data sampling intervals differ"
            );
        }
        if self.decision.iterations == 0 {
            bail!("decision.iterations must be > 0");
        }
        if !(0.0..=100.0).contains(&self.decision.participation_threshold) {
            bail!(
                "decision.participation_threshold must be within [0, 100], got {}",
                self.decision.participation_threshold
            );
        }
        self.mpc.validate().context("mpc section is invalid")?;
        Ok(())
    }
}
