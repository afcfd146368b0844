use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use crate::{
    config::Ties,
    data::SurvivalData,
    distributions::{chi2_sf, normal_quantile_two_sided, normal_two_sided_p},
    error::{SurvivalError, Result},
    metrics,
    optimization::{CoxOptimizer, FitResult, OptimizationConfig},
};

/// everything we keep around after a successful fit
#[derive(Debug, Clone)]
struct FittedState {
    result: FitResult,
    n_samples: usize,
    n_events: usize,
    concordance: f64,
    baseline_times: Vec<f64>,
    baseline_cumulative_hazard: Vec<f64>,
}

/// cox proportional hazards model
#[derive(Debug, Clone)]
pub struct CoxModel {
    l2_penalty: f64,                    // ridge penalty
    max_iterations: usize,              // newton-raphson limit
    tolerance: f64,                     // relative loglik change for convergence
    ties: Ties,                         // efron or breslow
    confidence_level: f64,              // for hazard ratio intervals
    feature_names: Option<Vec<String>>, // optional covariate labels
    fitted: Option<FittedState>,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 50,
            tolerance: 1e-9,
            ties: Ties::Efron,
            confidence_level: 0.95,
            feature_names: None,
            fitted: None,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// add ridge penalty (L2) - shrinks coefficients
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    /// max newton iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// tie handling for simultaneous events
    pub fn with_ties(mut self, ties: Ties) -> Self {
        self.ties = ties;
        self
    }

    /// level of the hazard ratio confidence intervals
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// give names to your covariates for nicer output
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// fit the model to data - this does the actual work
    ///
    /// on failure the model stays unfitted; nothing from a failed fit is kept
    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        self.fitted = None;

        if let Some(names) = &self.feature_names {
            if names.len() != data.n_features() {
                return Err(SurvivalError::invalid_dimensions(format!(
                    "{} feature names for {} covariates",
                    names.len(),
                    data.n_features()
                )));
            }
        }

        let config = OptimizationConfig {
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ties: self.ties,
        };

        let result = CoxOptimizer::new(config).optimize(data)?;
        info!(
            "cox fit converged in {} iterations (loglik {:.4}, null {:.4})",
            result.iterations, result.log_likelihood, result.null_log_likelihood
        );

        let risk_scores = data.covariates().dot(&result.coefficients);
        let concordance = metrics::harrell_c_index(risk_scores.view(), data.times(), data.events())?;
        let (baseline_times, baseline_cumulative_hazard) = breslow_baseline(data, risk_scores.view());
        debug!("baseline hazard has {} steps", baseline_times.len());

        self.fitted = Some(FittedState {
            result,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            concordance,
            baseline_times,
            baseline_cumulative_hazard,
        });

        Ok(self)
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(SurvivalError::ModelNotFitted)
    }

    /// get the fitted coefficients (betas)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.result.coefficients.view())
    }

    /// covariance matrix of the coefficients
    pub fn variance_matrix(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(self.state()?.result.variance.view())
    }

    /// standard errors of the coefficients
    pub fn standard_errors(&self) -> Result<Array1<f64>> {
        Ok(self.state()?.result.variance.diag().mapv(f64::sqrt))
    }

    pub fn log_likelihood(&self) -> Result<f64> {
        Ok(self.state()?.result.log_likelihood)
    }

    /// label of covariate `i` (`x{i}` when no names were given)
    pub fn feature_name(&self, i: usize) -> String {
        self.feature_names
            .as_ref()
            .and_then(|names| names.get(i).cloned())
            .unwrap_or_else(|| format!("x{}", i))
    }

    pub fn ties(&self) -> Ties {
        self.ties
    }

    /// predict risk scores (linear predictors) for new patients
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(SurvivalError::invalid_dimensions(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), covariates.ncols())
            ));
        }

        Ok(covariates.dot(&coefs))  // linear combination
    }

    /// predict hazard ratios (exp of risk scores)
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let linear_predictors = self.predict(covariates)?;
        Ok(linear_predictors.mapv(f64::exp))
    }

    /// breslow cumulative baseline hazard at `time` (covariates all zero)
    pub fn baseline_cumulative_hazard(&self, time: f64) -> Result<f64> {
        let state = self.state()?;
        let hazard = state
            .baseline_times
            .iter()
            .zip(&state.baseline_cumulative_hazard)
            .take_while(|(t, _)| **t <= time)
            .last()
            .map_or(0.0, |(_, &h)| h);
        Ok(hazard)
    }

    /// survival probs per patient (rows) at each requested time (columns)
    pub fn predict_survival(&self, covariates: ArrayView2<f64>, times: ArrayView1<f64>) -> Result<Array2<f64>> {
        let hazard_ratios = self.predict_hazard_ratios(covariates)?;
        let baseline = times
            .iter()
            .map(|&t| self.baseline_cumulative_hazard(t))
            .collect::<Result<Vec<_>>>()?;

        let mut survival_probs = Array2::zeros((covariates.nrows(), times.len()));
        for (j, &h0) in baseline.iter().enumerate() {
            for i in 0..covariates.nrows() {
                survival_probs[[i, j]] = (-h0 * hazard_ratios[i]).exp();
            }
        }

        Ok(survival_probs)
    }

    /// get a summary of the fitted model
    pub fn summary(&self) -> Result<CoxModelSummary> {
        let state = self.state()?;
        let result = &state.result;
        let z_crit = normal_quantile_two_sided(self.confidence_level)?;

        let rows = result
            .coefficients
            .iter()
            .enumerate()
            .map(|(i, &coef)| {
                CoefficientRow::new(self.feature_name(i), coef, result.variance[[i, i]].sqrt(), z_crit)
            })
            .collect::<Result<Vec<_>>>()?;

        let n_parameters = rows.len();
        let lr_statistic = (2.0 * (result.log_likelihood - result.null_log_likelihood)).max(0.0);

        Ok(CoxModelSummary {
            coefficients: rows,
            n_samples: state.n_samples,
            n_events: state.n_events,
            log_likelihood: result.log_likelihood,
            null_log_likelihood: result.null_log_likelihood,
            likelihood_ratio: lr_statistic,
            likelihood_ratio_df: n_parameters,
            likelihood_ratio_p: chi2_sf(lr_statistic, n_parameters)?,
            concordance: state.concordance,
            partial_aic: metrics::aic(result.log_likelihood, n_parameters),
            iterations: result.iterations,
            ties: self.ties,
            l2_penalty: self.l2_penalty,
            confidence_level: self.confidence_level,
        })
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// ridge penalty in use
    pub fn l2_penalty(&self) -> f64 {
        self.l2_penalty
    }
}

/// step function of the breslow baseline cumulative hazard
fn breslow_baseline(data: &SurvivalData, risk_scores: ArrayView1<f64>) -> (Vec<f64>, Vec<f64>) {
    let weights = risk_scores.mapv(f64::exp);
    let mut cumulative = 0.0;
    let mut times = Vec::with_capacity(data.risk_sets().len());
    let mut hazard = Vec::with_capacity(data.risk_sets().len());

    for set in data.risk_sets() {
        let denominator: f64 = set.at_risk.iter().map(|&i| weights[i]).sum();
        #[allow(clippy::cast_precision_loss)]
        let deaths = set.deaths.len() as f64;
        cumulative += deaths / denominator;
        times.push(set.time);
        hazard.push(cumulative);
    }

    (times, hazard)
}

/// one covariate line of the summary
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub coef: f64,         // log hazard ratio
    pub hazard_ratio: f64, // exp(coef)
    pub se: f64,
    pub z: f64,
    pub p_value: f64,
    pub hr_lower: f64,
    pub hr_upper: f64,
}

impl CoefficientRow {
    /// wald statistics for a coefficient and its standard error
    pub fn new(name: impl Into<String>, coef: f64, se: f64, z_crit: f64) -> Result<Self> {
        if !(se > 0.0) || !se.is_finite() {
            return Err(SurvivalError::numerical_error(format!(
                "standard error {se} is not usable"
            )));
        }
        let z = coef / se;
        Ok(Self {
            name: name.into(),
            coef,
            hazard_ratio: coef.exp(),
            se,
            z,
            p_value: normal_two_sided_p(z)?,
            hr_lower: (coef - z_crit * se).exp(),
            hr_upper: (coef + z_crit * se).exp(),
        })
    }
}

/// what the model learned
#[derive(Debug, Clone)]
pub struct CoxModelSummary {
    pub coefficients: Vec<CoefficientRow>,
    pub n_samples: usize,
    pub n_events: usize,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub likelihood_ratio: f64,
    pub likelihood_ratio_df: usize,
    pub likelihood_ratio_p: f64,
    pub concordance: f64,
    pub partial_aic: f64,
    pub iterations: usize,
    pub ties: Ties,
    pub l2_penalty: f64,
    pub confidence_level: f64,
}

impl CoxModelSummary {
    pub fn coefficient(&self, name: &str) -> Option<&CoefficientRow> {
        self.coefficients.iter().find(|row| row.name == name)
    }
}
