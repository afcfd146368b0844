//! k-sample log-rank test
//!
//! At every distinct event time the deaths are split across strata in
//! proportion to their risk sets (null hypothesis: one common hazard). The
//! statistic is `(O - E)ᵀ V⁻¹ (O - E)` over the first k-1 strata, chi-square
//! with k-1 degrees of freedom.

use std::collections::BTreeMap;

use log::debug;
use ndarray::{Array1, Array2};

use crate::distributions::chi2_sf;
use crate::error::{Result, SurvivalError};
use crate::linalg;

/// observed vs expected events for one stratum
#[derive(Debug, Clone, PartialEq)]
pub struct StratumCounts {
    pub label: String,
    pub n_subjects: usize,
    pub observed: f64,
    pub expected: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRankTest {
    pub grouping: String,
    pub strata: Vec<StratumCounts>,
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

impl LogRankTest {
    /// compare survival across the strata named by `labels`
    #[allow(clippy::cast_precision_loss)]
    pub fn compute<L>(
        grouping: impl Into<String>,
        times: &[f64],
        events: &[bool],
        labels: &[L],
    ) -> Result<Self>
    where
        L: AsRef<str>,
    {
        if times.len() != events.len() || times.len() != labels.len() {
            return Err(SurvivalError::invalid_dimensions(
                "times, events and labels must have same length",
            ));
        }

        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for label in labels {
            let next = index.len();
            index.entry(label.as_ref()).or_insert(next);
        }
        // re-number in sorted label order
        let names: Vec<&str> = index.keys().copied().collect();
        for (position, slot) in index.values_mut().enumerate() {
            *slot = position;
        }
        let k = names.len();
        if k < 2 {
            return Err(SurvivalError::InsufficientStrata { strata: k });
        }

        let group: Vec<usize> = labels.iter().map(|l| index[l.as_ref()]).collect();

        let mut event_times: Vec<f64> = times
            .iter()
            .zip(events)
            .filter_map(|(&t, &e)| e.then_some(t))
            .collect();
        event_times.sort_by(f64::total_cmp);
        event_times.dedup();

        let mut observed = Array1::<f64>::zeros(k);
        let mut expected = Array1::<f64>::zeros(k);
        let mut variance = Array2::<f64>::zeros((k, k));

        for &t in &event_times {
            let mut at_risk = vec![0.0; k];
            let mut deaths = vec![0.0; k];
            for i in 0..times.len() {
                if times[i] >= t {
                    at_risk[group[i]] += 1.0;
                    if times[i] == t && events[i] {
                        deaths[group[i]] += 1.0;
                    }
                }
            }

            let n: f64 = at_risk.iter().sum();
            let d: f64 = deaths.iter().sum();
            let spread = if n > 1.0 { d * (n - d) / (n - 1.0) } else { 0.0 };

            for j in 0..k {
                observed[j] += deaths[j];
                expected[j] += d * at_risk[j] / n;
                for l in 0..k {
                    let kronecker = if j == l { 1.0 } else { 0.0 };
                    variance[[j, l]] += spread * (at_risk[j] / n) * (kronecker - at_risk[l] / n);
                }
            }
        }

        // a stratum with nobody at risk next to another one carries no information
        let informative: Vec<usize> = (0..k).filter(|&j| variance[[j, j]] > 1e-12).collect();
        if informative.len() < k {
            debug!("{} of {} strata have zero variance", k - informative.len(), k);
        }
        // of the rest, one is redundant (rows of V sum to zero)
        let kept = &informative[..informative.len().saturating_sub(1)];
        let df = kept.len();

        let (statistic, p_value) = if df == 0 {
            (0.0, 1.0)
        } else {
            let diff: Array1<f64> = kept.iter().map(|&j| observed[j] - expected[j]).collect();
            let reduced = Array2::from_shape_fn((df, df), |(a, b)| variance[[kept[a], kept[b]]]);
            let statistic = if diff.iter().all(|x| x.abs() < 1e-12) {
                0.0
            } else {
                let solved = linalg::solve(&reduced, &diff)?;
                diff.dot(&solved)
            };
            (statistic, chi2_sf(statistic, df)?)
        };

        let strata = names
            .iter()
            .enumerate()
            .map(|(j, name)| StratumCounts {
                label: (*name).to_string(),
                n_subjects: group.iter().filter(|&&g| g == j).count(),
                observed: observed[j],
                expected: expected[j],
            })
            .collect();

        Ok(Self {
            grouping: grouping.into(),
            strata,
            statistic,
            df,
            p_value,
        })
    }
}
