//! analysis knobs - everything has a default so an empty `{}` config is valid

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, Stage, StageExt, SurvivalError};

/// how tied event times enter the partial likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ties {
    #[default]
    Efron,
    Breslow,
}

/// transform applied to event times before correlating them w/ schoenfeld residuals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeTransform {
    Identity,
    Log,
    #[default]
    Rank,
    Km,
}

/// survival plot options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub risk_table: bool,
    pub confidence_interval: bool,
    pub median_line: bool,
    pub show_p_value: bool,
    pub title: Option<String>,
    pub x_label: String,
    pub y_label: String,
    pub legend_title: Option<String>,
    /// overrides stratum names in the legend, in stratum order
    pub legend_labels: Option<Vec<String>>,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            risk_table: true,
            confidence_interval: true,
            median_line: true,
            show_p_value: true,
            title: None,
            x_label: "Time (days)".to_string(),
            y_label: "Survival probability".to_string(),
            legend_title: None,
            legend_labels: None,
            width: 900,
            height: 650,
        }
    }
}

impl PlotConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_legend_title(mut self, title: impl Into<String>) -> Self {
        self.legend_title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// status code meaning "event occurred"
    pub event_code: i64,
    /// status code meaning "censored"; any other code is a labeling error
    pub censor_code: i64,
    pub ties: Ties,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub l2_penalty: f64,
    pub confidence_level: f64,
    pub time_transform: TimeTransform,
    pub significance_level: f64,
    pub output_dir: PathBuf,
    pub export_file: String,
    pub plots: bool,
    pub plot: PlotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            event_code: 1,
            censor_code: 0,
            ties: Ties::Efron,
            max_iterations: 50,
            tolerance: 1e-9,
            l2_penalty: 0.0,
            confidence_level: 0.95,
            time_transform: TimeTransform::Rank,
            significance_level: 0.05,
            output_dir: PathBuf::from("output"),
            export_file: "ovarian.csv".to_string(),
            plots: true,
            plot: PlotConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// load from a json file; missing fields fall back to defaults
    pub fn from_path(path: &Path) -> Result<Self> {
        (|| -> Result<Self> {
            let text = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&text)
                .map_err(|e| SurvivalError::invalid_parameter("config", e.to_string()))?;
            config.validate()?;
            Ok(config)
        })()
        .stage(Stage::Config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_code == self.censor_code {
            return Err(SurvivalError::invalid_parameter(
                "censor_code",
                format!("{} (same as event_code)", self.censor_code),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SurvivalError::invalid_parameter(
                "confidence_level",
                self.confidence_level.to_string(),
            ));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(SurvivalError::invalid_parameter(
                "significance_level",
                self.significance_level.to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SurvivalError::invalid_parameter("max_iterations", "0"));
        }
        if !(self.tolerance > 0.0) {
            return Err(SurvivalError::invalid_parameter(
                "tolerance",
                self.tolerance.to_string(),
            ));
        }
        if !(self.l2_penalty >= 0.0) {
            return Err(SurvivalError::invalid_parameter(
                "l2_penalty",
                self.l2_penalty.to_string(),
            ));
        }
        Ok(())
    }

    pub fn export_path(&self) -> PathBuf {
        self.output_dir.join(&self.export_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: AnalysisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.event_code, 1);
        assert_eq!(config.ties, Ties::Efron);
        assert_eq!(config.time_transform, TimeTransform::Rank);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"event_code": 2, "ties": "breslow", "time_transform": "km", "plot": {"risk_table": false}}"#,
        )
        .unwrap();
        assert_eq!(config.event_code, 2);
        assert_eq!(config.ties, Ties::Breslow);
        assert_eq!(config.time_transform, TimeTransform::Km);
        assert!(!config.plot.risk_table);
        assert!(config.plot.confidence_interval);
    }

    #[test]
    fn test_validate_rejects_bad_levels() {
        let config = AnalysisConfig {
            confidence_level: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            max_iterations: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_status_code() {
        let config = AnalysisConfig {
            event_code: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            event_code: 0,
            censor_code: 1,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_errors_are_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"confidence_level": 2.0}"#).unwrap();
        let err = AnalysisConfig::from_path(&path).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Config));

        let err = AnalysisConfig::from_path(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Config));
    }
}
