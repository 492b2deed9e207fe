use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::params::ParameterVector;

/// Seedable source of standard normal draws. Streams sharing a seed but
/// differing in `stream` are independent.
#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: ChaCha20Rng,
}

impl RandomStream {
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self { rng }
    }

    pub fn normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}

/// `X + (alpha + beta X) dt + sigma X^gamma sqrt(dt) eps`.
pub fn euler_maruyama_step(x: f64, dt: f64, theta: &ParameterVector, eps: f64) -> f64 {
    x + theta.drift(x) * dt + theta.diffusion(x) * dt.sqrt() * eps
}

/// `paths x (steps + 1)` matrix, row-major. Column 0 holds the shared start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationEnsemble {
    paths: usize,
    steps: usize,
    data: Vec<f64>,
}

impl SimulationEnsemble {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, CoreError> {
        let paths = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if paths == 0 || width < 2 {
            return Err(CoreError::InvalidInput(
                "ensemble needs at least one path with one step".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(paths * width);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(CoreError::InvalidInput(format!(
                    "path {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            if let Some(step) = row.iter().position(|v| !v.is_finite()) {
                return Err(CoreError::NumericInstability {
                    path: i,
                    step,
                    value: row[step],
                });
            }
            data.extend(row);
        }
        Ok(Self {
            paths,
            steps: width - 1,
            data,
        })
    }

    pub fn paths(&self) -> usize {
        self.paths
    }

    /// Horizon `T`; each path has `T + 1` values.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn path(&self, i: usize) -> &[f64] {
        let w = self.steps + 1;
        &self.data[i * w..(i + 1) * w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.steps + 1)
    }

    pub fn value(&self, i: usize, k: usize) -> f64 {
        self.data[i * (self.steps + 1) + k]
    }

    pub fn column(&self, k: usize) -> Vec<f64> {
        self.rows().map(|row| row[k]).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathFailurePolicy {
    /// Any non-finite value aborts the run.
    #[default]
    Reject,
    /// Discard the failed path and redraw it from its own stream.
    Resample { max_attempts: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub horizon: usize,
    pub dt: f64,
    pub paths: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub failure_policy: PathFailurePolicy,
}

/// Euler-Maruyama Monte Carlo for the CKLS diffusion.
#[derive(Debug, Clone, Copy)]
pub struct PathSimulator {
    cfg: SimulatorConfig,
}

impl PathSimulator {
    pub fn new(cfg: SimulatorConfig) -> Result<Self, CoreError> {
        if cfg.horizon == 0 || cfg.paths == 0 {
            return Err(CoreError::InvalidInput(format!(
                "simulation needs paths and steps, got {} paths x {} steps",
                cfg.paths, cfg.horizon
            )));
        }
        if !(cfg.dt.is_finite() && cfg.dt > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "sampling interval must be positive, got {}",
                cfg.dt
            )));
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.cfg
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.cfg.seed = seed;
        self
    }

    /// Simulates every path in parallel; path `i` draws from stream `i` of
    /// the run seed. Without a seed a fresh one is drawn per call.
    pub fn simulate(&self, x0: f64, theta: &ParameterVector) -> Result<SimulationEnsemble, CoreError> {
        if !x0.is_finite() {
            return Err(CoreError::InvalidInput(format!("initial value is {x0}")));
        }
        theta.validate()?;
        let seed = self.cfg.seed.unwrap_or_else(|| rand::random());
        let width = self.cfg.horizon + 1;
        let mut data = vec![0.0; self.cfg.paths * width];
        data.par_chunks_mut(width)
            .enumerate()
            .try_for_each(|(i, row)| {
                let mut stream = RandomStream::new(seed, i as u64);
                self.fill_path(i, x0, theta, row, &mut stream)
            })?;
        Ok(SimulationEnsemble {
            paths: self.cfg.paths,
            steps: self.cfg.horizon,
            data,
        })
    }

    fn fill_path(
        &self,
        path: usize,
        x0: f64,
        theta: &ParameterVector,
        row: &mut [f64],
        stream: &mut RandomStream,
    ) -> Result<(), CoreError> {
        let max_attempts = match self.cfg.failure_policy {
            PathFailurePolicy::Reject => 1,
            PathFailurePolicy::Resample { max_attempts } => max_attempts.max(1),
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            match draw_path(x0, self.cfg.dt, theta, row, stream) {
                Ok(()) => return Ok(()),
                Err((step, value)) if attempt >= max_attempts => {
                    return Err(CoreError::NumericInstability { path, step, value });
                }
                Err((step, value)) => {
                    tracing::debug!(path, step, value, attempt, "discarding non-finite path");
                }
            }
        }
    }
}

fn draw_path(
    x0: f64,
    dt: f64,
    theta: &ParameterVector,
    row: &mut [f64],
    stream: &mut RandomStream,
) -> Result<(), (usize, f64)> {
    row[0] = x0;
    for k in 1..row.len() {
        let next = euler_maruyama_step(row[k - 1], dt, theta, stream.normal());
        if !next.is_finite() {
            return Err((k, next));
        }
        row[k] = next;
    }
    Ok(())
}
