//! Kaplan-Meier product-limit estimation.
//!
//! The survival function is a step function over the distinct observed times:
//!
//! ```text
//! S(t) = Π_{t_i <= t} (1 - d_i / n_i)
//! ```
//!
//! where `d_i` is the number of events at `t_i` and `n_i` the number of
//! subjects still under observation just before `t_i`. Deaths at a time are
//! counted before the subjects censored at that same time leave the risk set.
//!
//! Pointwise confidence bounds use Greenwood's variance on the
//! `log(-log S)` scale, which keeps them inside `[0, 1]`.
//!
//! # Examples
//!
//! ```
//! use ovarian_survival::kaplan_meier::KaplanMeierCurve;
//!
//! let times = [5.0, 10.0, 10.0, 15.0];
//! let events = [true, true, false, true];
//! let curve = KaplanMeierCurve::fit(&times, &events, 0.95).unwrap();
//!
//! assert_eq!(curve.survival_at(5.0), 0.75);
//! assert_eq!(curve.median_survival(), Some(10.0));
//! ```

use std::collections::BTreeMap;

use crate::distributions::normal_quantile_two_sided;
use crate::error::{Result, SurvivalError};

/// One row of a life table.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalTableRow {
    /// Observed time (0 for the leading row).
    pub time: f64,
    /// Subjects with follow-up `>= time`.
    pub at_risk: usize,
    /// Events exactly at `time`.
    pub events: usize,
    /// Censorings exactly at `time`.
    pub censored: usize,
    /// Survival probability just after `time`.
    pub survival: f64,
    /// Lower confidence bound.
    pub lower: f64,
    /// Upper confidence bound.
    pub upper: f64,
}

/// Kaplan-Meier survival curve for one stratum.
#[derive(Debug, Clone, PartialEq)]
pub struct KaplanMeierCurve {
    /// Stratum label (`"all"` for the unstratified curve).
    pub label: String,
    /// Confidence level of the bounds in [`SurvivalTableRow`].
    pub confidence_level: f64,
    rows: Vec<SurvivalTableRow>,
}

impl KaplanMeierCurve {
    /// Fits the product-limit estimator.
    ///
    /// # Arguments
    ///
    /// * `times` - follow-up time per subject
    /// * `events` - `true` if the subject had the event, `false` if censored
    /// * `confidence_level` - e.g. `0.95`
    ///
    /// # Errors
    ///
    /// Mismatched lengths, empty input, negative or non-finite times.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(times: &[f64], events: &[bool], confidence_level: f64) -> Result<Self> {
        if times.len() != events.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                times.len(),
                events.len()
            )));
        }
        if times.is_empty() {
            return Err(SurvivalError::invalid_survival_data("no subjects to estimate from"));
        }
        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "survival times must be non-negative & finite",
            ));
        }
        let z = normal_quantile_two_sided(confidence_level)?;

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));

        let total = times.len();
        let mut rows = Vec::new();
        if times[order[0]] > 0.0 {
            rows.push(SurvivalTableRow {
                time: 0.0,
                at_risk: total,
                events: 0,
                censored: 0,
                survival: 1.0,
                lower: 1.0,
                upper: 1.0,
            });
        }

        let mut survival = 1.0;
        let mut greenwood = 0.0;
        let mut i = 0;
        while i < order.len() {
            let current_time = times[order[i]];
            let at_risk = total - i;

            let mut event_count = 0;
            let mut censored_count = 0;
            let mut j = i;
            while j < order.len() && times[order[j]] == current_time {
                if events[order[j]] {
                    event_count += 1;
                } else {
                    censored_count += 1;
                }
                j += 1;
            }

            if event_count > 0 {
                let n = at_risk as f64;
                let d = event_count as f64;
                survival *= 1.0 - d / n;
                if at_risk > event_count {
                    greenwood += d / (n * (n - d));
                }
            }

            let (lower, upper) = log_log_bounds(survival, greenwood, z);
            rows.push(SurvivalTableRow {
                time: current_time,
                at_risk,
                events: event_count,
                censored: censored_count,
                survival,
                lower,
                upper,
            });

            i = j;
        }

        Ok(Self {
            label: "all".to_string(),
            confidence_level,
            rows,
        })
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Life table: the leading time-0 row plus one row per distinct observed time.
    pub fn table(&self) -> &[SurvivalTableRow] {
        &self.rows
    }

    pub fn n_subjects(&self) -> usize {
        self.rows.first().map_or(0, |row| row.at_risk)
    }

    pub fn n_events(&self) -> usize {
        self.rows.iter().map(|row| row.events).sum()
    }

    /// Largest observed time.
    pub fn max_time(&self) -> f64 {
        self.rows.last().map_or(0.0, |row| row.time)
    }

    /// Median survival time: the first time at which survival drops to 0.5
    /// or below. `None` when the curve never gets there.
    pub fn median_survival(&self) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.survival <= 0.5)
            .map(|row| row.time)
    }

    /// Survival probability at `time` (right-continuous step lookup).
    ///
    /// Returns `1.0` before the first observed time and the last estimate
    /// beyond the end of follow-up.
    pub fn survival_at(&self, time: f64) -> f64 {
        self.rows
            .iter()
            .rev()
            .find(|row| row.time <= time)
            .map_or(1.0, |row| row.survival)
    }

    /// Number of subjects still under observation at `time`.
    pub fn at_risk_at(&self, time: f64) -> usize {
        self.rows
            .iter()
            .find(|row| row.time >= time)
            .map_or(0, |row| row.at_risk)
    }
}

/// exponential Greenwood bounds
fn log_log_bounds(survival: f64, greenwood: f64, z: f64) -> (f64, f64) {
    if survival >= 1.0 {
        return (1.0, 1.0);
    }
    if survival <= 0.0 {
        return (0.0, 0.0);
    }
    let log_s = survival.ln();
    let theta = (-log_s).ln();
    let se = greenwood.sqrt() / log_s.abs();
    let lower = (-(theta + z * se).exp()).exp();
    let upper = (-(theta - z * se).exp()).exp();
    (lower, upper)
}

/// One Kaplan-Meier curve per level of a categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedKaplanMeier {
    /// Name of the grouping column.
    pub grouping: String,
    /// Curves in sorted label order.
    pub curves: Vec<KaplanMeierCurve>,
}

impl GroupedKaplanMeier {
    /// Splits subjects by `labels` and fits each stratum.
    pub fn fit<L>(
        grouping: impl Into<String>,
        times: &[f64],
        events: &[bool],
        labels: &[L],
        confidence_level: f64,
    ) -> Result<Self>
    where
        L: AsRef<str>,
    {
        if labels.len() != times.len() || events.len() != times.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times ({}), events ({}) and labels ({}) must have same length",
                times.len(),
                events.len(),
                labels.len()
            )));
        }

        let mut strata: BTreeMap<&str, (Vec<f64>, Vec<bool>)> = BTreeMap::new();
        for ((&time, &event), label) in times.iter().zip(events).zip(labels) {
            let entry = strata.entry(label.as_ref()).or_default();
            entry.0.push(time);
            entry.1.push(event);
        }

        let curves = strata
            .into_iter()
            .map(|(label, (t, e))| {
                KaplanMeierCurve::fit(&t, &e, confidence_level).map(|c| c.with_label(label))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            grouping: grouping.into(),
            curves,
        })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.curves.iter().map(|c| c.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario() -> KaplanMeierCurve {
        KaplanMeierCurve::fit(&[5.0, 10.0, 10.0, 15.0], &[true, true, false, true], 0.95).unwrap()
    }

    #[test]
    fn test_product_limit_scenario() {
        let curve = scenario();
        assert_relative_eq!(curve.survival_at(0.0), 1.0);
        assert_relative_eq!(curve.survival_at(4.9), 1.0);
        assert_relative_eq!(curve.survival_at(5.0), 0.75);
        assert_relative_eq!(curve.survival_at(10.0), 0.5);
        assert_relative_eq!(curve.survival_at(15.0), 0.0);
        assert_relative_eq!(curve.survival_at(100.0), 0.0);
    }

    #[test]
    fn test_life_table_counts() {
        let curve = scenario();
        let table = curve.table();
        assert_eq!(table.len(), 4);
        assert_eq!(table[0].time, 0.0);
        assert_eq!(table[0].at_risk, 4);
        assert_eq!((table[1].at_risk, table[1].events, table[1].censored), (4, 1, 0));
        assert_eq!((table[2].at_risk, table[2].events, table[2].censored), (3, 1, 1));
        assert_eq!((table[3].at_risk, table[3].events, table[3].censored), (1, 1, 0));
        assert_eq!(curve.n_subjects(), 4);
        assert_eq!(curve.n_events(), 3);
    }

    #[test]
    fn test_median() {
        assert_eq!(scenario().median_survival(), Some(10.0));

        let censored_heavy =
            KaplanMeierCurve::fit(&[1.0, 2.0, 3.0, 4.0], &[true, false, false, false], 0.95).unwrap();
        assert_eq!(censored_heavy.median_survival(), None);
    }

    #[test]
    fn test_monotone_and_bounded() {
        let times = [3.0, 8.0, 8.0, 12.0, 15.0, 15.0, 20.0, 22.0, 30.0, 31.0];
        let events = [true, true, false, true, true, true, false, true, false, true];
        let curve = KaplanMeierCurve::fit(&times, &events, 0.95).unwrap();

        let mut previous = 1.0;
        for row in curve.table() {
            assert!(row.survival <= previous + 1e-15);
            assert!((0.0..=1.0).contains(&row.survival));
            assert!(row.lower <= row.survival + 1e-12 && row.survival <= row.upper + 1e-12);
            assert!(row.lower >= 0.0 && row.upper <= 1.0);
            previous = row.survival;
        }
    }

    #[test]
    fn test_greenwood_bounds_single_step() {
        // one death among 10: S = 0.9, var(log S) = 1 / (10 * 9)
        let times: Vec<f64> = (1..=10).map(f64::from).collect();
        let mut events = vec![false; 10];
        events[0] = true;
        let curve = KaplanMeierCurve::fit(&times, &events, 0.95).unwrap();
        let row = &curve.table()[1];

        let z = 1.959_963_984_540_054_f64;
        let theta = (-(0.9_f64.ln())).ln();
        let se = (1.0_f64 / 90.0).sqrt() / 0.9_f64.ln().abs();
        assert_relative_eq!(row.lower, (-(theta + z * se).exp()).exp(), epsilon = 1e-6);
        assert_relative_eq!(row.upper, (-(theta - z * se).exp()).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_at_risk_lookup() {
        let curve = scenario();
        assert_eq!(curve.at_risk_at(0.0), 4);
        assert_eq!(curve.at_risk_at(7.0), 3);
        assert_eq!(curve.at_risk_at(15.0), 1);
        assert_eq!(curve.at_risk_at(16.0), 0);
    }

    #[test]
    fn test_single_stratum_equals_overall() {
        let times = [5.0, 10.0, 10.0, 15.0, 2.0];
        let events = [true, true, false, true, false];
        let overall = KaplanMeierCurve::fit(&times, &events, 0.95).unwrap();
        let grouped = GroupedKaplanMeier::fit("all", &times, &events, &["all"; 5], 0.95).unwrap();

        assert_eq!(grouped.curves.len(), 1);
        assert_eq!(grouped.curves[0], overall);
    }

    #[test]
    fn test_grouped_strata_sorted() {
        let times = [1.0, 2.0, 3.0, 4.0];
        let events = [true, true, false, true];
        let labels = ["treatment", "control", "treatment", "control"];
        let grouped = GroupedKaplanMeier::fit("arm", &times, &events, &labels, 0.95).unwrap();

        assert_eq!(grouped.labels(), vec!["control", "treatment"]);
        assert_eq!(grouped.curves[0].n_subjects(), 2);
        assert_eq!(grouped.curves[1].n_events(), 1);
    }

    #[test]
    fn test_bad_input() {
        assert!(KaplanMeierCurve::fit(&[], &[], 0.95).is_err());
        assert!(KaplanMeierCurve::fit(&[1.0], &[true, false], 0.95).is_err());
        assert!(KaplanMeierCurve::fit(&[-1.0], &[true], 0.95).is_err());
        assert!(GroupedKaplanMeier::fit("x", &[1.0], &[true], &["a", "b"], 0.95).is_err());
    }
}
