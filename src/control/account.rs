use crate::simulation::SimulationEnsemble;

/// Self-financing account values `V[i, 0..=T]` for one fixed control.
///
/// `V[i, k+1] = V[i, k] (1 + r_f) + u (S[i, k+1] - (1 + r_f) S[i, k])`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountTrajectories {
    steps: usize,
    values: Vec<f64>,
}

impl AccountTrajectories {
    pub fn compute(ensemble: &SimulationEnsemble, initial_value: f64, risk_free: f64, control: f64) -> Self {
        let growth = 1.0 + risk_free;
        let steps = ensemble.steps();
        let mut values = Vec::with_capacity(ensemble.paths() * (steps + 1));
        for prices in ensemble.rows() {
            let mut v = initial_value;
            values.push(v);
            for k in 0..steps {
                v = v * growth + control * (prices[k + 1] - growth * prices[k]);
                values.push(v);
            }
        }
        Self { steps, values }
    }

    pub fn path(&self, i: usize) -> &[f64] {
        let w = self.steps + 1;
        &self.values[i * w..(i + 1) * w]
    }

    pub fn paths(&self) -> usize {
        self.values.len() / (self.steps + 1)
    }

    pub fn terminal_values(&self) -> Vec<f64> {
        self.values
            .chunks(self.steps + 1)
            .map(|row| row[self.steps])
            .collect()
    }

    pub fn min_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn expected_terminal_value(&self) -> f64 {
        let terminal = self.terminal_values();
        terminal.iter().sum::<f64>() / terminal.len() as f64
    }

    /// Cross-path population variance of the terminal values.
    pub fn terminal_variance(&self) -> f64 {
        let terminal = self.terminal_values();
        let n = terminal.len() as f64;
        let mean = terminal.iter().sum::<f64>() / n;
        terminal.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
    }
}

/// Mean terminal account value over the ensemble for a fixed control.
pub fn account_expected_value(
    ensemble: &SimulationEnsemble,
    initial_value: f64,
    risk_free: f64,
    control: f64,
) -> f64 {
    AccountTrajectories::compute(ensemble, initial_value, risk_free, control).expected_terminal_value()
}
