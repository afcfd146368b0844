//! The linear analysis run: load, preprocess, KM, log-rank, Cox, PH check,
//! plots, export. Every failure comes back tagged with the stage it hit.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::assumptions::ProportionalHazardsTest;
use crate::config::AnalysisConfig;
use crate::dataset::Dataset;
use crate::error::{Result, Stage, StageExt, SurvivalError};
use crate::kaplan_meier::{GroupedKaplanMeier, KaplanMeierCurve};
use crate::logrank::LogRankTest;
use crate::model::{CoxModel, CoxModelSummary};
use crate::plot::render_km_plot;
use crate::preprocess::{CoxDesign, LabeledDataset, ResidualDisease, StatusCoding, TreatmentArm};
use crate::report::{CoxTable, LifeTable, LogRankTable, MedianTable, PhTestTable};

/// where the six-column table comes from
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DataSource {
    #[default]
    Embedded,
    File(PathBuf),
}

impl DataSource {
    pub fn load(&self) -> Result<Dataset> {
        match self {
            DataSource::Embedded => Dataset::ovarian(),
            DataSource::File(path) => Dataset::from_path(path),
        }
    }
}

/// everything the run produced
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub n_subjects: usize,
    pub n_events: usize,
    pub overall: KaplanMeierCurve,
    pub by_treatment: GroupedKaplanMeier,
    pub by_residual: GroupedKaplanMeier,
    pub treatment_logrank: LogRankTest,
    pub residual_logrank: LogRankTest,
    pub cox: CoxModelSummary,
    /// baseline level per cox covariate, `None` for continuous ones
    pub cox_reference_levels: Vec<Option<String>>,
    pub ph_test: ProportionalHazardsTest,
    pub significance_level: f64,
    /// svg files written, empty when plotting is off
    pub plots: Vec<PathBuf>,
    pub export_path: Option<PathBuf>,
}

/// run the statistics only; nothing touches the filesystem
pub fn analyze(config: &AnalysisConfig, dataset: &Dataset) -> Result<AnalysisReport> {
    config.validate().stage(Stage::Config)?;

    info!("preprocessing {} records", dataset.len());
    let status = StatusCoding {
        event: config.event_code,
        censored: config.censor_code,
    };
    let labeled = LabeledDataset::from_dataset(dataset, status).stage(Stage::Preprocess)?;
    let design = CoxDesign::build(&labeled).stage(Stage::Preprocess)?;
    let times = labeled.times();
    let events = labeled.events();
    let treatment = labeled.treatment_labels();
    let residual = labeled.residual_labels();

    info!("fitting kaplan-meier curves");
    let (overall, by_treatment, by_residual) = (|| -> Result<_> {
        let overall = KaplanMeierCurve::fit(&times, &events, config.confidence_level)?;
        let by_treatment = GroupedKaplanMeier::fit(
            TreatmentArm::COLUMN,
            &times,
            &events,
            &treatment,
            config.confidence_level,
        )?;
        let by_residual = GroupedKaplanMeier::fit(
            ResidualDisease::COLUMN,
            &times,
            &events,
            &residual,
            config.confidence_level,
        )?;
        Ok((overall, by_treatment, by_residual))
    })()
    .stage(Stage::KaplanMeier)?;

    for curve in std::iter::once(&overall).chain(&by_treatment.curves).chain(&by_residual.curves) {
        if curve.median_survival().is_none() {
            warn!("median survival not reached for {}", curve.label);
        }
    }

    info!("running log-rank tests");
    let treatment_logrank =
        LogRankTest::compute(TreatmentArm::COLUMN, &times, &events, &treatment).stage(Stage::LogRank)?;
    let residual_logrank =
        LogRankTest::compute(ResidualDisease::COLUMN, &times, &events, &residual).stage(Stage::LogRank)?;

    info!("fitting cox model on {}", design.feature_names.join(", "));
    let mut model = CoxModel::new()
        .with_ties(config.ties)
        .with_max_iterations(config.max_iterations)
        .with_tolerance(config.tolerance)
        .with_l2_penalty(config.l2_penalty)
        .with_confidence_level(config.confidence_level)
        .with_feature_names(design.feature_names.clone());
    let cox = (|| -> Result<CoxModelSummary> {
        model.fit(&design.data)?;
        model.summary()
    })()
    .stage(Stage::Cox)?;

    info!("checking proportional hazards");
    let ph_test = ProportionalHazardsTest::compute(&model, &design.data, config.time_transform)
        .stage(Stage::AssumptionCheck)?;

    Ok(AnalysisReport {
        n_subjects: labeled.len(),
        n_events: labeled.n_events(),
        overall,
        by_treatment,
        by_residual,
        treatment_logrank,
        residual_logrank,
        cox,
        cox_reference_levels: design.reference_levels,
        ph_test,
        significance_level: config.significance_level,
        plots: Vec::new(),
        export_path: None,
    })
}

/// the full run, including plots and the csv export
pub fn run(config: &AnalysisConfig, source: &DataSource) -> Result<AnalysisReport> {
    info!("loading dataset from {:?}", source);
    let dataset = source.load().stage(Stage::Load)?;
    let mut report = analyze(config, &dataset)?;

    fs::create_dir_all(&config.output_dir).map_err(|e| SurvivalError::from(e).at(Stage::Export))?;

    if config.plots {
        report.plots = write_plots(config, &report).stage(Stage::Plot)?;
    }

    let export_path = config.export_path();
    info!("exporting dataset to {}", export_path.display());
    dataset.export(&export_path).stage(Stage::Export)?;
    report.export_path = Some(export_path);

    Ok(report)
}

fn write_plots(config: &AnalysisConfig, report: &AnalysisReport) -> Result<Vec<PathBuf>> {
    let overall_path = config.output_dir.join("km_overall.svg");
    render_km_plot(
        &overall_path,
        std::slice::from_ref(&report.overall),
        None,
        &config.plot,
        "Kaplan-Meier survival, all subjects",
    )?;

    let treatment_path = config.output_dir.join("km_by_treatment.svg");
    render_km_plot(
        &treatment_path,
        &report.by_treatment.curves,
        Some(report.treatment_logrank.p_value),
        &config.plot,
        "Kaplan-Meier survival by treatment arm",
    )?;

    let residual_path = config.output_dir.join("km_by_residual.svg");
    render_km_plot(
        &residual_path,
        &report.by_residual.curves,
        Some(report.residual_logrank.p_value),
        &config.plot,
        "Kaplan-Meier survival by residual disease",
    )?;

    Ok(vec![overall_path, treatment_path, residual_path])
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} subjects, {} events\n", self.n_subjects, self.n_events)?;

        writeln!(f, "{}", LifeTable(&self.overall))?;
        for grouped in [&self.by_treatment, &self.by_residual] {
            for curve in &grouped.curves {
                writeln!(f, "{}", LifeTable(curve))?;
            }
        }

        writeln!(f, "Median survival")?;
        let mut curves = vec![self.overall.clone()];
        curves.extend(self.by_treatment.curves.iter().cloned());
        curves.extend(self.by_residual.curves.iter().cloned());
        writeln!(f, "{}", MedianTable(&curves))?;

        writeln!(f, "{}", LogRankTable(&self.treatment_logrank))?;
        writeln!(f, "{}", LogRankTable(&self.residual_logrank))?;
        writeln!(
            f,
            "{}",
            CoxTable {
                summary: &self.cox,
                reference_levels: &self.cox_reference_levels
            }
        )?;
        write!(
            f,
            "{}",
            PhTestTable {
                test: &self.ph_test,
                alpha: self.significance_level
            }
        )?;

        if !self.plots.is_empty() || self.export_path.is_some() {
            writeln!(f)?;
        }
        for path in &self.plots {
            writeln!(f, "plot: {}", path.display())?;
        }
        if let Some(path) = &self.export_path {
            writeln!(f, "export: {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SubjectRecord;

    #[test]
    fn test_analyze_embedded() {
        let dataset = Dataset::ovarian().unwrap();
        let report = analyze(&AnalysisConfig::default(), &dataset).unwrap();
        assert_eq!(report.n_subjects, 26);
        assert_eq!(report.n_events, 12);
        assert_eq!(report.by_treatment.curves.len(), 2);
        assert_eq!(report.by_residual.curves.len(), 2);
        assert_eq!(report.treatment_logrank.df, 1);
        assert_eq!(report.cox.coefficients.len(), 3);
        assert_eq!(report.ph_test.covariates.len(), 3);
        assert!(report.plots.is_empty());
        assert_eq!(report.cox_reference_levels[0].as_deref(), Some("control"));
        assert!(report.to_string().contains("residual relative to no_residual"));
    }

    #[test]
    fn test_bad_config_is_tagged() {
        let dataset = Dataset::ovarian().unwrap();
        let config = AnalysisConfig { confidence_level: 1.5, ..AnalysisConfig::default() };
        let err = analyze(&config, &dataset).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Config));
        assert!(err.to_string().starts_with("config stage failed"));
    }

    #[test]
    fn test_unknown_code_is_tagged() {
        let mut records = Dataset::ovarian().unwrap().records().to_vec();
        records[3] = SubjectRecord { rx: 3, ..records[3].clone() };
        let dataset = Dataset::new(records).unwrap();
        let err = analyze(&AnalysisConfig::default(), &dataset).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Preprocess));
        assert!(err.to_string().contains("preprocess"));
    }

    #[test]
    fn test_missing_file_is_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            output_dir: dir.path().to_path_buf(),
            ..AnalysisConfig::default()
        };
        let source = DataSource::File(dir.path().join("nope.csv"));
        let err = run(&config, &source).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Load));
        match err {
            SurvivalError::Stage { source, .. } => {
                assert!(matches!(*source, SurvivalError::MissingDataset { .. }))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            output_dir: dir.path().join("out"),
            ..AnalysisConfig::default()
        };
        let report = run(&config, &DataSource::Embedded).unwrap();
        assert_eq!(report.plots.len(), 3);
        for path in &report.plots {
            assert!(path.exists());
        }
        let exported = std::fs::read_to_string(report.export_path.as_ref().unwrap()).unwrap();
        assert_eq!(exported.lines().count(), 27);

        let text = report.to_string();
        assert!(text.contains("Log-rank test: rx"));
        assert!(text.contains("GLOBAL"));
    }
}
