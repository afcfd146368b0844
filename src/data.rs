use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{SurvivalError, Result};

/// who died and who was still at risk at one distinct event time
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSet {
    pub time: f64,
    pub deaths: Vec<usize>,   // subjects w/ an event exactly at `time`
    pub at_risk: Vec<usize>,  // subjects w/ follow-up >= `time`
}

/// survival data - times, events, and patient covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,          // time to event/censoring
    events: Vec<bool>,           // true = event, false = censored
    covariates: Array2<f64>,     // patient covariates (n_samples x n_features)
    risk_sets: Vec<RiskSet>,     // precomputed, ordered by event time
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays
    pub fn new(
        times: Vec<f64>,         // survival/censoring times
        events: Vec<bool>,       // true = event occurred, false = censored
        covariates: Array2<f64>, // patient covariate matrix
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("covariates rows ({}) != n_samples ({})", covariates.nrows(), n_samples)
            ));
        }

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "survival times must be non-negative & finite"
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "covariates must be finite"
            ));
        }

        let mut data = Self {
            times: Array1::from(times),
            events,
            covariates,
            risk_sets: Vec::new(),
        };

        data.compute_risk_sets();
        Ok(data)
    }

    /// precompute risk sets for each event time (who's still at risk)
    fn compute_risk_sets(&mut self) {
        self.risk_sets = self
            .event_times()
            .into_iter()
            .map(|event_time| {
                let deaths = (0..self.n_samples())
                    .filter(|&i| self.events[i] && self.times[i] == event_time)
                    .collect();
                let at_risk = (0..self.n_samples())
                    .filter(|&i| self.times[i] >= event_time)
                    .collect();
                RiskSet { time: event_time, deaths, at_risk }
            })
            .collect();
    }

    /// how many patients
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per patient
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    /// how many observed events
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// patient covariate matrix
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    /// precomputed risk sets, one per distinct event time
    pub fn risk_sets(&self) -> &[RiskSet] {
        &self.risk_sets
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self.times
            .iter()
            .zip(self.events.iter())
            .filter_map(|(time, event)| if *event { Some(*time) } else { None })
            .collect();

        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// column means - used to center covariates before fitting
    pub fn covariate_means(&self) -> Array1<f64> {
        self.covariates
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 3.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec((5, 2), vec![
            1.0, 2.0,
            3.0, 4.0,
            5.0, 6.0,
            7.0, 8.0,
            9.0, 10.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_survival_data_creation() {
        let data = create_test_data();
        assert_eq!(data.n_samples(), 5);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.n_events(), 3);
        assert_eq!(data.event_times(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_risk_sets_with_ties() {
        let data = create_test_data();
        let sets = data.risk_sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].deaths, vec![0]);
        assert_eq!(sets[0].at_risk, vec![0, 1, 2, 3, 4]);
        assert_eq!(sets[1].time, 3.0);
        assert_eq!(sets[1].deaths, vec![2, 3]);
        assert_eq!(sets[1].at_risk, vec![2, 3, 4]);
    }

    #[test]
    fn test_invalid_dimensions() {
        let times = vec![1.0, 2.0];
        let events = vec![true];  // wrong length
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());
    }

    #[test]
    fn test_invalid_times() {
        let times = vec![-1.0, 2.0];  // negative time
        let events = vec![true, false];
        let covariates = Array2::zeros((2, 2));

        assert!(SurvivalData::new(times, events, covariates).is_err());
    }

    #[test]
    fn test_zero_time_allowed() {
        let data = SurvivalData::new(vec![0.0, 2.0], vec![true, false], Array2::zeros((2, 1)));
        assert!(data.is_ok());
    }

    #[test]
    fn test_covariate_means() {
        let data = create_test_data();
        let means = data.covariate_means();
        assert_relative_eq!(means[0], 5.0, epsilon = 1e-10);
        assert_relative_eq!(means[1], 6.0, epsilon = 1e-10);
    }
}
