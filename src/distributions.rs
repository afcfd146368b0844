//! tail probabilities for the test statistics, backed by statrs

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use crate::error::{SurvivalError, Result};

/// P(X >= statistic) for X ~ chi-square(df)
pub fn chi2_sf(statistic: f64, df: usize) -> Result<f64> {
    if df == 0 {
        return Err(SurvivalError::invalid_parameter("df", "0"));
    }
    if statistic.is_nan() {
        return Err(SurvivalError::numerical_error("chi-square statistic is NaN"));
    }
    if statistic <= 0.0 {
        return Ok(1.0);
    }
    let dist = ChiSquared::new(df as f64)
        .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
    Ok(dist.sf(statistic).clamp(0.0, 1.0))
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| SurvivalError::numerical_error(e.to_string()))
}

/// two-sided p-value for a standard normal z score
pub fn normal_two_sided_p(z: f64) -> Result<f64> {
    if z.is_nan() {
        return Err(SurvivalError::numerical_error("z score is NaN"));
    }
    Ok((2.0 * standard_normal()?.sf(z.abs())).clamp(0.0, 1.0))
}

/// z such that P(|Z| <= z) = level
pub fn normal_quantile_two_sided(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(SurvivalError::invalid_parameter("confidence_level", level.to_string()));
    }
    Ok(standard_normal()?.inverse_cdf(0.5 + level / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_chi2_known_values() {
        // 3.841 is the 95% point of chi2(1)
        assert_relative_eq!(chi2_sf(3.841_458_820_694_124, 1).unwrap(), 0.05, epsilon = 1e-6);
        assert_relative_eq!(chi2_sf(5.991_464_547_107_979, 2).unwrap(), 0.05, epsilon = 1e-6);
        assert_eq!(chi2_sf(0.0, 1).unwrap(), 1.0);
        assert!(chi2_sf(1.0, 0).is_err());
    }

    #[test]
    fn test_normal_helpers() {
        assert_relative_eq!(normal_quantile_two_sided(0.95).unwrap(), 1.959_963_984_540_054, epsilon = 1e-7);
        assert_relative_eq!(normal_two_sided_p(1.959_963_984_540_054).unwrap(), 0.05, epsilon = 1e-7);
        assert_relative_eq!(normal_two_sided_p(0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert!(normal_quantile_two_sided(1.0).is_err());
    }
}
