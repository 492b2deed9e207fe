use ckls_mpc::error::CoreError;
use ckls_mpc::stats::{sample_mean, sample_variance};

#[test]
/// Verifies the estimators against hand-computed textbook values.
fn mean_and_unbiased_variance_match_textbook() {
    let x = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
    assert!((sample_mean(&x).unwrap() - 5.0).abs() < 1e-12);
    // Sum of squared deviations is 32; unbiased divisor is n - 1 = 7.
    assert!((sample_variance(&x).unwrap() - 32.0 / 7.0).abs() < 1e-12);
}

#[test]
/// Verifies variance is invariant to a level shift of a positive series.
fn variance_ignores_level_shift() {
    let x: Vec<f64> = (1..=50).map(|i| 1.0 + (i as f64 * 0.37).sin().abs()).collect();
    let shifted: Vec<f64> = x.iter().map(|v| v + 1000.0).collect();
    let a = sample_variance(&x).unwrap();
    let b = sample_variance(&shifted).unwrap();
    assert!((a - b).abs() < 1e-9);
}

#[test]
fn tiny_samples_are_degenerate() {
    assert!(matches!(sample_mean(&[]), Err(CoreError::DataDegeneracy(_))));
    assert!(matches!(
        sample_variance(&[1.0]),
        Err(CoreError::DataDegeneracy(_))
    ));
}
