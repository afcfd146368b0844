//! Proportional-hazards diagnostics from Schoenfeld residuals.
//!
//! For every event the Schoenfeld residual is the covariate vector of the
//! subject who died minus the risk-set weighted mean at that time. Scaled
//! residuals (`D · V · r + β`) estimate the time-varying coefficient β(t), so
//! a trend against (transformed) time signals a non-proportional hazard.
//!
//! The per-covariate statistic is
//!
//! ```text
//! T_j = (Σ_k g̃_k r*_kj)² / (D · V_jj · Σ_k g̃_k²)
//! ```
//!
//! with `g̃` the centered transformed event times and `D` the number of
//! events; it is chi-square with one degree of freedom. The global test uses
//! the full covariance and has `p` degrees of freedom.

use log::{debug, warn};
use ndarray::{Array1, Array2};

use crate::config::TimeTransform;
use crate::data::SurvivalData;
use crate::distributions::chi2_sf;
use crate::error::{Result, SurvivalError};
use crate::kaplan_meier::KaplanMeierCurve;
use crate::model::CoxModel;
use crate::optimization::{centered_covariates, risk_set_means};

/// one row per event, in event-time order
#[derive(Debug, Clone)]
pub struct SchoenfeldResiduals {
    pub event_times: Vec<f64>,
    /// events x covariates
    pub residuals: Array2<f64>,
    /// `D · r · V + β`, same shape as `residuals`
    pub scaled: Array2<f64>,
}

impl SchoenfeldResiduals {
    pub fn compute(model: &CoxModel, data: &SurvivalData) -> Result<Self> {
        let beta = model.coefficients()?.to_owned();
        if beta.len() != data.n_features() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "model has {} coefficients, data has {} covariates",
                beta.len(),
                data.n_features()
            )));
        }
        let variance = model.variance_matrix()?.to_owned();

        let x = centered_covariates(data);
        let means = risk_set_means(x.view(), data.risk_sets(), &beta, model.ties())?;

        let n_events = data.n_events();
        let p = data.n_features();
        let mut event_times = Vec::with_capacity(n_events);
        let mut residuals = Array2::zeros((n_events, p));

        let mut k = 0;
        for (set, mean) in data.risk_sets().iter().zip(&means) {
            for &i in &set.deaths {
                event_times.push(set.time);
                residuals.row_mut(k).assign(&(&x.row(i) - mean));
                k += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let d = n_events as f64;
        let scaled = residuals.dot(&variance) * d + &beta.insert_axis(ndarray::Axis(0));

        Ok(Self { event_times, residuals, scaled })
    }

    pub fn n_events(&self) -> usize {
        self.event_times.len()
    }
}

/// chi-square test for one covariate (or the global row)
#[derive(Debug, Clone, PartialEq)]
pub struct PhTestRow {
    pub name: String,
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

impl PhTestRow {
    /// p > alpha: proportionality not rejected
    pub fn assumption_holds(&self, alpha: f64) -> bool {
        self.p_value > alpha
    }
}

#[derive(Debug, Clone)]
pub struct ProportionalHazardsTest {
    pub transform: TimeTransform,
    pub covariates: Vec<PhTestRow>,
    pub global: PhTestRow,
}

impl ProportionalHazardsTest {
    pub fn compute(model: &CoxModel, data: &SurvivalData, transform: TimeTransform) -> Result<Self> {
        let residuals = SchoenfeldResiduals::compute(model, data)?;
        let n_events = residuals.n_events();
        if n_events < 2 {
            return Err(SurvivalError::invalid_survival_data(
                "need at least 2 events to test proportional hazards",
            ));
        }

        let g = transform_times(&residuals.event_times, data, transform)?;
        let g_mean = g.mean().unwrap_or(0.0);
        let g = g.mapv(|v| v - g_mean);
        let g_ss = g.dot(&g);
        if !(g_ss > 0.0) {
            return Err(SurvivalError::numerical_error(
                "transformed event times have no spread",
            ));
        }

        let variance = model.variance_matrix()?.to_owned();
        #[allow(clippy::cast_precision_loss)]
        let d = n_events as f64;

        // u = Σ g̃ r (unscaled); the scaled version is D·V·u since Σ g̃ = 0
        let u: Array1<f64> = residuals.residuals.t().dot(&g);
        let vu = variance.dot(&u);

        let covariates = (0..u.len())
            .map(|j| {
                let statistic = d * vu[j] * vu[j] / (variance[[j, j]] * g_ss);
                Ok(PhTestRow {
                    name: model.feature_name(j),
                    statistic,
                    df: 1,
                    p_value: chi2_sf(statistic, 1)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let global_statistic = d * u.dot(&vu) / g_ss;
        let global = PhTestRow {
            name: "GLOBAL".to_string(),
            statistic: global_statistic,
            df: u.len(),
            p_value: chi2_sf(global_statistic, u.len())?,
        };

        debug!("ph test ({:?}): global chi2 = {:.4}", transform, global.statistic);
        for row in &covariates {
            if !row.assumption_holds(0.05) {
                warn!("{}: proportional hazards looks violated (p = {:.4})", row.name, row.p_value);
            }
        }

        Ok(Self { transform, covariates, global })
    }
}

/// transformed event times, one per event
fn transform_times(times: &[f64], data: &SurvivalData, transform: TimeTransform) -> Result<Array1<f64>> {
    let values = match transform {
        TimeTransform::Identity => times.to_vec(),
        TimeTransform::Log => {
            if times.iter().any(|&t| t <= 0.0) {
                return Err(SurvivalError::invalid_survival_data(
                    "log time transform needs positive event times",
                ));
            }
            times.iter().map(|t| t.ln()).collect()
        }
        TimeTransform::Rank => average_ranks(times),
        TimeTransform::Km => {
            let times_all = data.times().to_vec();
            let km = KaplanMeierCurve::fit(&times_all, data.events(), 0.95)?;
            times.iter().map(|&t| 1.0 - km.survival_at(t)).collect()
        }
    };
    Ok(Array1::from(values))
}

/// 1-based ranks, ties get the average rank
#[allow(clippy::cast_precision_loss)]
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}
