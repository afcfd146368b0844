use ndarray::ArrayView1;
use crate::error::{SurvivalError, Result};

/// Harrell's C-index with tie handling - how often do higher risk scores = shorter survival?
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores, times, and events must have same length"
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored obs can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j outlived i (event later, or censored no earlier)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0.0 {
        return Err(SurvivalError::numerical_error(
            "no comparable pairs for C-index calculation"
        ));
    }

    // ties count as half
    Ok((concordant + 0.5 * tied_risk) / total_pairs)
}

/// partial AIC for a cox model
#[allow(clippy::cast_precision_loss)]
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SurvivalData;
    use ndarray::{array, Array1, Array2};
    use approx::assert_relative_eq;

    fn create_test_data() -> (SurvivalData, Array1<f64>) {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 2.0,
            0.0, 1.0,
            1.0, 0.0,
            -1.0, 1.0,
            0.0, -1.0,
        ]).unwrap();

        let data = SurvivalData::new(times, events, covariates).unwrap();
        let risk_scores = Array1::from(vec![0.5, -0.2, 0.8, -0.1, -0.5]);

        (data, risk_scores)
    }

    #[test]
    fn test_harrell_c_index_bounds() {
        let (data, risk_scores) = create_test_data();
        let c = harrell_c_index(risk_scores.view(), data.times(), data.events()).unwrap();
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn test_perfect_concordance() {
        let times = array![1.0, 2.0, 3.0, 4.0];
        let events = vec![true, true, true, true];
        let risk_scores = array![4.0, 3.0, 2.0, 1.0]; // anti-correlated with time

        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_scores_give_half() {
        let times = array![1.0, 2.0, 3.0];
        let events = vec![true, true, false];
        let risk_scores = array![0.0, 0.0, 0.0];
        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_aic() {
        assert_relative_eq!(aic(-10.0, 3), 26.0);
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let risk_scores = array![1.0, 2.0];
        let times = array![1.0, 2.0, 3.0]; // different length
        let events = vec![true, false];

        assert!(harrell_c_index(risk_scores.view(), times.view(), &events).is_err());
    }
}
