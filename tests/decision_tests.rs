use ckls_mpc::control::{DecisionConfig, InvestmentDecisionEngine, MpcConfig, StochasticMpcController};
use ckls_mpc::error::CoreError;
use ckls_mpc::model::ParameterVector;
use ckls_mpc::simulation::{PathFailurePolicy, PathSimulator, SimulatorConfig};

const DT: f64 = 1.0 / 252.0;

fn engine(cfg: DecisionConfig, initial_value: f64, seed: Option<u64>) -> InvestmentDecisionEngine {
    let simulator = PathSimulator::new(SimulatorConfig {
        horizon: 10,
        dt: DT,
        paths: 200,
        seed,
        failure_policy: PathFailurePolicy::Reject,
    })
    .unwrap();
    let controller =
        StochasticMpcController::new(MpcConfig::new(initial_value, 0.0, 1e-3, 1.0)).unwrap();
    InvestmentDecisionEngine::new(cfg, simulator, controller).unwrap()
}

fn rising() -> ParameterVector {
    ParameterVector::new(0.0, 2.0, 0.1, 1.0)
}

fn falling() -> ParameterVector {
    ParameterVector::new(0.0, -2.0, 0.1, 1.0)
}

#[test]
/// Verifies a strong upward drift makes every trial go long.
fn rising_market_gets_full_participation() {
    let decision = engine(DecisionConfig::new(8, 60.0), 10_000.0, Some(7))
        .decide(100.0, &rising())
        .unwrap();
    assert_eq!(decision.controls.len(), 8);
    assert_eq!(decision.ensembles.len(), 8);
    assert_eq!(decision.participation_pct, 100.0);
    assert!(decision.control > 0.0);
    assert!(decision.invests());
    assert_eq!(decision.infeasible_trials, 0);
}

#[test]
/// Verifies the participation test is strict: 100% never clears a 100% bar.
fn threshold_is_strict() {
    let decision = engine(DecisionConfig::new(4, 100.0), 10_000.0, Some(7))
        .decide(100.0, &rising())
        .unwrap();
    assert_eq!(decision.participation_pct, 100.0);
    assert_eq!(decision.control, 0.0);
}

#[test]
fn falling_market_stays_flat() {
    let decision = engine(DecisionConfig::new(6, 50.0), 10_000.0, Some(3))
        .decide(100.0, &falling())
        .unwrap();
    assert_eq!(decision.participation_pct, 0.0);
    assert_eq!(decision.control, 0.0);
    assert!(decision.controls.iter().all(|u| *u == 0.0));
}

#[test]
/// Verifies a fixed seed reproduces every trial and the final control.
fn seeded_decisions_are_reproducible() {
    let mut cfg = DecisionConfig::new(5, 60.0);
    cfg.seed = Some(1234);
    let a = engine(cfg, 10_000.0, None).decide(100.0, &rising()).unwrap();
    let b = engine(cfg, 10_000.0, None).decide(100.0, &rising()).unwrap();
    assert_eq!(a.controls, b.controls);
    assert_eq!(a.control, b.control);
    assert_eq!(a.ensembles, b.ensembles);
    assert_ne!(a.run_id, b.run_id);
    assert_ne!(a.ensembles[0], a.ensembles[1]);
}

#[test]
/// Verifies infeasible trials count as no trade instead of failing the run.
fn infeasible_trials_count_as_zero() {
    let decision = engine(DecisionConfig::new(3, 60.0), 50.0, Some(9))
        .decide(100.0, &rising())
        .unwrap();
    assert_eq!(decision.infeasible_trials, 3);
    assert_eq!(decision.control, 0.0);
}

#[test]
/// Verifies simulation failures propagate unless trials may be skipped.
fn failed_trials_propagate_or_exhaust() {
    let exploding = ParameterVector::new(-50.0, 0.0, 0.5, 0.5);
    let err = engine(DecisionConfig::new(2, 60.0), 10_000.0, Some(1))
        .decide(1.0, &exploding)
        .unwrap_err();
    assert!(matches!(err, CoreError::NumericInstability { .. }));

    let mut cfg = DecisionConfig::new(2, 60.0);
    cfg.skip_failed_trials = true;
    let err = engine(cfg, 10_000.0, Some(1))
        .decide(1.0, &exploding)
        .unwrap_err();
    assert!(matches!(err, CoreError::DataDegeneracy(_)));
}

#[test]
fn engine_rejects_bad_configuration() {
    let simulator = PathSimulator::new(SimulatorConfig {
        horizon: 1,
        dt: DT,
        paths: 1,
        seed: None,
        failure_policy: PathFailurePolicy::Reject,
    })
    .unwrap();
    let controller =
        StochasticMpcController::new(MpcConfig::new(10_000.0, 0.0, 1e-3, 1.0)).unwrap();
    assert!(InvestmentDecisionEngine::new(DecisionConfig::new(0, 60.0), simulator, controller.clone()).is_err());
    assert!(InvestmentDecisionEngine::new(DecisionConfig::new(1, 150.0), simulator, controller).is_err());
}
