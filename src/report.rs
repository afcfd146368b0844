//! Fixed-width text tables for every analysis summary
//!
//! Each table is a small `Display` wrapper, so callers can `println!` it or
//! collect it with `to_string()`.

use std::fmt;

use crate::assumptions::{PhTestRow, ProportionalHazardsTest};
use crate::kaplan_meier::KaplanMeierCurve;
use crate::logrank::LogRankTest;
use crate::model::CoxModelSummary;

/// verdict text for a PH test row
pub fn ph_interpretation(row: &PhTestRow, alpha: f64) -> String {
    if row.assumption_holds(alpha) {
        format!("p > {alpha}: assumption not rejected")
    } else {
        format!("p <= {alpha}: assumption violated, hazard ratio may be time-varying")
    }
}

fn format_p(p: f64) -> String {
    if p < 1e-4 {
        format!("{p:.2e}")
    } else {
        format!("{p:.4}")
    }
}

fn separator(f: &mut fmt::Formatter<'_>, width: usize) -> fmt::Result {
    writeln!(f, "  {}", "-".repeat(width))
}

/// life table for one curve
pub struct LifeTable<'a>(pub &'a KaplanMeierCurve);

impl fmt::Display for LifeTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let curve = self.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (curve.confidence_level * 100.0).round() as u32;
        writeln!(
            f,
            "Kaplan-Meier: {} (n = {}, events = {})",
            curve.label,
            curve.n_subjects(),
            curve.n_events()
        )?;
        writeln!(
            f,
            "  {:>8} {:>8} {:>7} {:>9} {:>10} {:>10} {:>10}",
            "Time",
            "AtRisk",
            "Events",
            "Censored",
            "Survival",
            format!("Lower{pct}"),
            format!("Upper{pct}"),
        )?;
        separator(f, 68)?;
        for row in curve.table() {
            writeln!(
                f,
                "  {:>8.1} {:>8} {:>7} {:>9} {:>10.4} {:>10.4} {:>10.4}",
                row.time, row.at_risk, row.events, row.censored, row.survival, row.lower, row.upper
            )?;
        }
        Ok(())
    }
}

/// one line per curve with its median
pub struct MedianTable<'a>(pub &'a [KaplanMeierCurve]);

impl fmt::Display for MedianTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {:<20} {:>8} {:>8} {:>12}", "Stratum", "N", "Events", "Median")?;
        separator(f, 51)?;
        for curve in self.0 {
            let median = curve
                .median_survival()
                .map_or("not reached".to_string(), |m| format!("{m:.1}"));
            writeln!(
                f,
                "  {:<20} {:>8} {:>8} {:>12}",
                curve.label,
                curve.n_subjects(),
                curve.n_events(),
                median
            )?;
        }
        Ok(())
    }
}

pub struct LogRankTable<'a>(pub &'a LogRankTest);

impl fmt::Display for LogRankTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let test = self.0;
        writeln!(f, "Log-rank test: {}", test.grouping)?;
        writeln!(
            f,
            "  {:<20} {:>8} {:>10} {:>10} {:>10}",
            "Stratum", "N", "Observed", "Expected", "O/E"
        )?;
        separator(f, 62)?;
        for stratum in &test.strata {
            let ratio = if stratum.expected > 0.0 {
                format!("{:.3}", stratum.observed / stratum.expected)
            } else {
                "N/A".to_string()
            };
            writeln!(
                f,
                "  {:<20} {:>8} {:>10.1} {:>10.3} {:>10}",
                stratum.label, stratum.n_subjects, stratum.observed, stratum.expected, ratio
            )?;
        }
        writeln!(
            f,
            "  chi-square = {:.4} on {} df, p = {}",
            test.statistic,
            test.df,
            format_p(test.p_value)
        )
    }
}

/// cox coefficients; `reference_levels` lines up with the coefficient rows
pub struct CoxTable<'a> {
    pub summary: &'a CoxModelSummary,
    pub reference_levels: &'a [Option<String>],
}

impl fmt::Display for CoxTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (s.confidence_level * 100.0).round() as u32;
        writeln!(
            f,
            "Cox proportional hazards (n = {}, events = {}, ties = {:?})",
            s.n_samples, s.n_events, s.ties
        )?;
        writeln!(
            f,
            "  {:<12} {:>9} {:>10} {:>9} {:>8} {:>10} {:>10} {:>10}",
            "Covariate",
            "coef",
            "exp(coef)",
            "se(coef)",
            "z",
            "p",
            format!("lower{pct}"),
            format!("upper{pct}"),
        )?;
        separator(f, 85)?;
        for row in &s.coefficients {
            writeln!(
                f,
                "  {:<12} {:>9.4} {:>10.4} {:>9.4} {:>8.3} {:>10} {:>10.4} {:>10.4}",
                row.name,
                row.coef,
                row.hazard_ratio,
                row.se,
                row.z,
                format_p(row.p_value),
                row.hr_lower,
                row.hr_upper
            )?;
        }
        for (row, level) in s.coefficients.iter().zip(self.reference_levels) {
            if let Some(level) = level {
                writeln!(f, "  {} relative to {}", row.name, level)?;
            }
        }
        writeln!(
            f,
            "  log-likelihood = {:.4} (null {:.4}), iterations = {}",
            s.log_likelihood, s.null_log_likelihood, s.iterations
        )?;
        writeln!(
            f,
            "  likelihood ratio test = {:.4} on {} df, p = {}",
            s.likelihood_ratio,
            s.likelihood_ratio_df,
            format_p(s.likelihood_ratio_p)
        )?;
        if s.l2_penalty > 0.0 {
            writeln!(f, "  ridge penalty = {}", s.l2_penalty)?;
        }
        writeln!(
            f,
            "  concordance = {:.4}, partial AIC = {:.3}",
            s.concordance, s.partial_aic
        )
    }
}

/// PH test table with the verdict for each row
pub struct PhTestTable<'a> {
    pub test: &'a ProportionalHazardsTest,
    pub alpha: f64,
}

impl fmt::Display for PhTestTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Proportional hazards test (Schoenfeld residuals, {:?} time)",
            self.test.transform
        )?;
        writeln!(
            f,
            "  {:<12} {:>10} {:>4} {:>10}  {}",
            "Covariate", "chi2", "df", "p", "Interpretation"
        )?;
        separator(f, 96)?;
        for row in self.test.covariates.iter().chain(std::iter::once(&self.test.global)) {
            writeln!(
                f,
                "  {:<12} {:>10.4} {:>4} {:>10}  {}",
                row.name,
                row.statistic,
                row.df,
                format_p(row.p_value),
                ph_interpretation(row, self.alpha)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeTransform;
    use crate::data::SurvivalData;
    use crate::model::CoxModel;
    use ndarray::array;

    fn curve() -> KaplanMeierCurve {
        KaplanMeierCurve::fit(&[5.0, 10.0, 10.0, 15.0], &[true, true, false, true], 0.95)
            .unwrap()
            .with_label("all")
    }

    #[test]
    fn test_life_table() {
        let text = LifeTable(&curve()).to_string();
        assert!(text.starts_with("Kaplan-Meier: all (n = 4, events = 3)"));
        assert!(text.contains("Lower95"));
        assert!(text.contains("0.7500"));
    }

    #[test]
    fn test_median_table() {
        let censored = KaplanMeierCurve::fit(&[1.0, 2.0], &[false, false], 0.95)
            .unwrap()
            .with_label("none");
        let text = MedianTable(&[curve(), censored]).to_string();
        assert!(text.contains("10.0"));
        assert!(text.contains("not reached"));
    }

    #[test]
    fn test_interpretation() {
        let row = PhTestRow { name: "age".into(), statistic: 0.2, df: 1, p_value: 0.6 };
        assert!(ph_interpretation(&row, 0.05).contains("not rejected"));
        let row = PhTestRow { p_value: 0.01, ..row };
        assert!(ph_interpretation(&row, 0.05).contains("time-varying"));
    }

    #[test]
    fn test_ph_table_lists_global() {
        let row = PhTestRow { name: "age".into(), statistic: 0.2, df: 1, p_value: 0.6 };
        let test = ProportionalHazardsTest {
            transform: TimeTransform::Rank,
            covariates: vec![row.clone()],
            global: PhTestRow { name: "GLOBAL".into(), ..row },
        };
        let text = PhTestTable { test: &test, alpha: 0.05 }.to_string();
        assert!(text.contains("age"));
        assert!(text.contains("GLOBAL"));
    }

    #[test]
    fn test_cox_table_names_reference_levels() {
        let data = SurvivalData::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![true, true, false, true, true, false],
            array![[1.0, 50.0], [0.0, 61.0], [1.0, 44.0], [0.0, 70.0], [1.0, 58.0], [0.0, 49.0]],
        )
        .unwrap();
        let mut model = CoxModel::new().with_feature_names(vec!["treatment".into(), "age".into()]);
        model.fit(&data).unwrap();
        let summary = model.summary().unwrap();

        let levels = [Some("control".to_string()), None];
        let text = CoxTable { summary: &summary, reference_levels: &levels }.to_string();
        assert!(text.contains("treatment relative to control"));
        assert!(!text.contains("age relative to"));
        assert!(text.contains("likelihood ratio test"));
    }

    #[test]
    fn test_format_p() {
        assert_eq!(format_p(0.5), "0.5000");
        assert_eq!(format_p(0.00001), "1.00e-5");
    }
}
