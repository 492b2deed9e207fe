use ckls_mpc::control::{
    account_expected_value, AccountTrajectories, MpcConfig, StochasticMpcController,
    TradeDirection,
};
use ckls_mpc::model::ParameterVector;
use ckls_mpc::optim::SolveStatus;
use ckls_mpc::simulation::{PathFailurePolicy, PathSimulator, SimulationEnsemble, SimulatorConfig};

const DT: f64 = 1.0 / 252.0;

fn ensemble(theta: ParameterVector, paths: usize, horizon: usize, seed: u64) -> SimulationEnsemble {
    PathSimulator::new(SimulatorConfig {
        horizon,
        dt: DT,
        paths,
        seed: Some(seed),
        failure_policy: PathFailurePolicy::Reject,
    })
    .unwrap()
    .simulate(100.0, &theta)
    .unwrap()
}

fn martingale_ensemble() -> SimulationEnsemble {
    ensemble(ParameterVector::new(0.0, 0.0, 0.2, 1.0), 1000, 20, 2024)
}

fn controller(risk_aversion: f64, leverage: f64) -> StochasticMpcController {
    StochasticMpcController::new(MpcConfig::new(10_000.0, 0.0, risk_aversion, leverage)).unwrap()
}

#[test]
/// Verifies the self-financing recursion on a hand-computed two-path case.
fn account_recursion_matches_hand_computation() {
    let ens = SimulationEnsemble::from_rows(vec![vec![10.0, 11.0, 12.0], vec![10.0, 9.0, 8.0]])
        .unwrap();
    let acc = AccountTrajectories::compute(&ens, 1000.0, 0.01, 2.0);
    assert_eq!(acc.paths(), 2);
    assert!((acc.path(0)[1] - 1011.8).abs() < 1e-9);
    assert!((acc.path(0)[2] - 1023.698).abs() < 1e-9);
    assert!((acc.path(1)[2] - 1015.698).abs() < 1e-9);
    assert!((account_expected_value(&ens, 1000.0, 0.01, 2.0) - 1019.698).abs() < 1e-9);
    assert!((acc.terminal_variance() - 16.0).abs() < 1e-6);
}

#[test]
/// Verifies position size shrinks monotonically as risk aversion grows.
fn control_magnitude_is_non_increasing_in_risk_aversion() {
    let ens = martingale_ensemble();
    let grid = [0.0, 1e-4, 1e-3, 1e-2, 1e-1, 1.0, 10.0];
    let controls: Vec<f64> = grid
        .iter()
        .map(|lambda| {
            controller(*lambda, 1.0)
                .solve(&ens, TradeDirection::Both)
                .unwrap()
                .control
        })
        .collect();
    for pair in controls.windows(2) {
        assert!(pair[1].abs() <= pair[0].abs() + 1e-12, "{controls:?}");
    }
    assert!(controls[grid.len() - 1].abs() < controls[0].abs());
}

#[test]
/// Verifies that without risk aversion the control maximizes the expected
/// terminal value over the feasible range.
fn risk_neutral_control_maximizes_expectation() {
    let ens = martingale_ensemble();
    let sol = controller(0.0, 1.0).solve(&ens, TradeDirection::Both).unwrap();
    assert_eq!(sol.status, SolveStatus::Bound);
    let (lo, hi) = sol.feasible_range;
    assert!(lo < 0.0 && hi > 0.0);
    let best = account_expected_value(&ens, 10_000.0, 0.0, sol.raw_control);
    for u in [lo, 0.0, hi, 0.5 * lo, 0.5 * hi] {
        assert!(best >= account_expected_value(&ens, 10_000.0, 0.0, u) - 1e-6);
    }
    assert!(sol.control >= lo && sol.control <= hi);
}

#[test]
/// Verifies the solution honours the leverage bound and the solvency floor on every path.
fn solution_respects_leverage_and_solvency() {
    let ens = martingale_ensemble();
    let beta = 0.8;
    let sol = controller(1e-3, beta).solve(&ens, TradeDirection::Both).unwrap();
    let acc = AccountTrajectories::compute(&ens, 10_000.0, 0.0, sol.control);
    for i in 0..ens.paths() {
        let prices = ens.path(i);
        let values = acc.path(i);
        for k in 0..ens.steps() {
            assert!((sol.control * prices[k]).abs() <= beta * values[k] + 1e-6);
        }
    }
    assert!(acc.min_value() >= 100.0);
}

#[test]
/// Verifies a zero leverage limit leaves only the flat position and says so.
fn zero_leverage_is_degenerate() {
    let ens = martingale_ensemble();
    let sol = controller(1e-3, 0.0).solve(&ens, TradeDirection::Both).unwrap();
    assert_eq!(sol.status, SolveStatus::Degenerate);
    assert_eq!(sol.control, 0.0);
    assert!(!sol.is_tradable());
}

#[test]
/// Verifies an account starting below the solvency floor is infeasible, not clipped.
fn account_below_floor_is_infeasible() {
    let ens = martingale_ensemble();
    let ctrl = StochasticMpcController::new(MpcConfig::new(50.0, 0.0, 1e-3, 1.0)).unwrap();
    let err = ctrl.solve(&ens, TradeDirection::Long).unwrap_err();
    assert!(err.is_infeasible());
}

#[test]
/// Verifies the sign restriction: a falling market gives no long position.
fn long_only_stays_flat_in_falling_market() {
    let falling = ensemble(ParameterVector::new(0.0, -3.0, 0.1, 1.0), 300, 20, 5);
    let long = controller(1e-3, 1.0).solve(&falling, TradeDirection::Long).unwrap();
    assert_eq!(long.control, 0.0);
    let short = controller(1e-3, 1.0).solve(&falling, TradeDirection::Short).unwrap();
    assert!(short.control < 0.0);
}

#[test]
fn trade_direction_parsing() {
    assert_eq!(TradeDirection::parse("L"), TradeDirection::Long);
    assert_eq!(TradeDirection::parse("short"), TradeDirection::Short);
    assert_eq!(TradeDirection::parse("x"), TradeDirection::Both);
}
