use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

/// pipeline step an error came out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Preprocess,
    KaplanMeier,
    LogRank,
    Cox,
    AssumptionCheck,
    Plot,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Load => "load",
            Self::Preprocess => "preprocess",
            Self::KaplanMeier => "kaplan-meier",
            Self::LogRank => "log-rank",
            Self::Cox => "cox",
            Self::AssumptionCheck => "assumption-check",
            Self::Plot => "plot",
            Self::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SurvivalError {
    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("cox fit did not converge: {message}")]
    ConvergenceFailed { message: String },

    #[error("information matrix is not positive definite: {message}")]
    NotPositiveDefinite { message: String },

    #[error("no events observed - partial likelihood is undefined")]
    NoEvents,

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },

    #[error("column `{column}` has code {code} with no label")]
    UnknownCode { column: &'static str, code: i64 },

    #[error("unknown label `{label}` for column `{column}`")]
    UnknownLabel { column: &'static str, label: String },

    #[error("log-rank test needs at least 2 strata, got {strata}")]
    InsufficientStrata { strata: usize },

    #[error("dataset not found at {path}")]
    MissingDataset { path: String },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("plot rendering failed: {message}")]
    Plot { message: String },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<SurvivalError>,
    },
}

impl SurvivalError {
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn convergence_failed(message: impl Into<String>) -> Self {
        Self::ConvergenceFailed { message: message.into() }
    }

    pub fn not_positive_definite(message: impl Into<String>) -> Self {
        Self::NotPositiveDefinite { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }

    pub fn unknown_code(column: &'static str, code: i64) -> Self {
        Self::UnknownCode { column, code }
    }

    pub fn plot(message: impl Into<String>) -> Self {
        Self::Plot { message: message.into() }
    }

    /// tag with the stage it happened in (already tagged errors keep their stage)
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// `result.stage(Stage::Cox)?` shorthand for tagging
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.at(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging_names_stage() {
        let err = SurvivalError::unknown_code("rx", 3).at(Stage::Preprocess);
        assert_eq!(err.stage(), Some(Stage::Preprocess));
        let msg = err.to_string();
        assert!(msg.starts_with("preprocess stage failed"));
        assert!(msg.contains("code 3"));
    }

    #[test]
    fn test_stage_tagging_is_idempotent() {
        let err = SurvivalError::NoEvents.at(Stage::Cox).at(Stage::Export);
        assert_eq!(err.stage(), Some(Stage::Cox));
    }
}
