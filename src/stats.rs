use crate::error::CoreError;

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

pub fn sample_mean(x: &[f64]) -> Result<f64, CoreError> {
    if x.is_empty() {
        return Err(CoreError::DataDegeneracy(
            "sample mean of an empty sample".to_string(),
        ));
    }
    Ok(x.iter().sum::<f64>() / x.len() as f64)
}

/// Unbiased sample variance (divides by `n - 1`).
pub fn sample_variance(x: &[f64]) -> Result<f64, CoreError> {
    if x.len() < 2 {
        return Err(CoreError::DataDegeneracy(format!(
            "sample variance needs at least 2 values, got {}",
            x.len()
        )));
    }
    let mean = sample_mean(x)?;
    let ss: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
    Ok(ss / (x.len() - 1) as f64)
}

/// Normal density with the given mean and standard deviation.
pub fn gaussian_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    INV_SQRT_2PI / sd * (-0.5 * z * z).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_peak_matches_closed_form() {
        let peak = gaussian_pdf(0.0, 0.0, 1.0);
        assert!((peak - 1.0 / (2.0 * std::f64::consts::PI).sqrt()).abs() < 1e-15);
        assert!((gaussian_pdf(3.0, 1.0, 2.0) - gaussian_pdf(-1.0, 1.0, 2.0)).abs() < 1e-15);
    }
}
