//! Maps coded columns onto labeled categories and builds the model inputs.
//!
//! Source codes are never rewritten: [`LabeledSubject`] carries the original
//! record next to the derived labels.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use crate::data::SurvivalData;
use crate::dataset::{Dataset, SubjectRecord};
use crate::error::{Result, SurvivalError};

/// treatment arm (`rx`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreatmentArm {
    Control,
    Treatment,
}

/// residual disease status (`resid_ds`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResidualDisease {
    NoResidual,
    Residual,
}

impl TreatmentArm {
    pub const COLUMN: &'static str = "rx";
    pub const LEVELS: [TreatmentArm; 2] = [TreatmentArm::Control, TreatmentArm::Treatment];

    pub fn code(self) -> i64 {
        match self {
            Self::Control => 1,
            Self::Treatment => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }
}

impl ResidualDisease {
    pub const COLUMN: &'static str = "resid_ds";
    pub const LEVELS: [ResidualDisease; 2] = [ResidualDisease::NoResidual, ResidualDisease::Residual];

    pub fn code(self) -> i64 {
        match self {
            Self::NoResidual => 1,
            Self::Residual => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoResidual => "no_residual",
            Self::Residual => "residual",
        }
    }
}

impl TryFrom<i64> for TreatmentArm {
    type Error = SurvivalError;

    fn try_from(code: i64) -> Result<Self> {
        Self::LEVELS
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or_else(|| SurvivalError::unknown_code(Self::COLUMN, code))
    }
}

impl TryFrom<i64> for ResidualDisease {
    type Error = SurvivalError;

    fn try_from(code: i64) -> Result<Self> {
        Self::LEVELS
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or_else(|| SurvivalError::unknown_code(Self::COLUMN, code))
    }
}

impl FromStr for TreatmentArm {
    type Err = SurvivalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::LEVELS
            .into_iter()
            .find(|level| level.label() == s)
            .ok_or_else(|| SurvivalError::UnknownLabel {
                column: Self::COLUMN,
                label: s.to_string(),
            })
    }
}

impl FromStr for ResidualDisease {
    type Err = SurvivalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::LEVELS
            .into_iter()
            .find(|level| level.label() == s)
            .ok_or_else(|| SurvivalError::UnknownLabel {
                column: Self::COLUMN,
                label: s.to_string(),
            })
    }
}

impl fmt::Display for TreatmentArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for ResidualDisease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// which `fustat` codes mean event and censored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCoding {
    pub event: i64,
    pub censored: i64,
}

impl Default for StatusCoding {
    fn default() -> Self {
        Self { event: 1, censored: 0 }
    }
}

impl StatusCoding {
    pub const COLUMN: &'static str = "fustat";

    /// `true` for an event, `false` for censored, error for anything else
    pub fn classify(self, code: i64) -> Result<bool> {
        if code == self.event {
            Ok(true)
        } else if code == self.censored {
            Ok(false)
        } else {
            Err(SurvivalError::unknown_code(Self::COLUMN, code))
        }
    }
}

/// source record plus derived columns
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSubject {
    pub record: SubjectRecord,
    pub event: bool,
    pub treatment: TreatmentArm,
    pub residual: ResidualDisease,
}

impl LabeledSubject {
    pub fn time(&self) -> f64 {
        self.record.futime
    }
}

/// the whole table after labeling
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    subjects: Vec<LabeledSubject>,
}

impl LabeledDataset {
    /// label every row; the first unmappable code aborts
    pub fn from_dataset(dataset: &Dataset, status: StatusCoding) -> Result<Self> {
        let subjects = dataset
            .records()
            .iter()
            .map(|record| {
                Ok(LabeledSubject {
                    event: status.classify(record.fustat)?,
                    treatment: TreatmentArm::try_from(record.rx)?,
                    residual: ResidualDisease::try_from(record.resid_ds)?,
                    record: record.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { subjects })
    }

    pub fn subjects(&self) -> &[LabeledSubject] {
        &self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.subjects.iter().map(LabeledSubject::time).collect()
    }

    pub fn events(&self) -> Vec<bool> {
        self.subjects.iter().map(|s| s.event).collect()
    }

    pub fn n_events(&self) -> usize {
        self.subjects.iter().filter(|s| s.event).count()
    }

    pub fn treatment_labels(&self) -> Vec<&'static str> {
        self.subjects.iter().map(|s| s.treatment.label()).collect()
    }

    pub fn residual_labels(&self) -> Vec<&'static str> {
        self.subjects.iter().map(|s| s.residual.label()).collect()
    }
}

/// covariate matrix for the cox fit: treatment & residual indicators + age
#[derive(Debug, Clone)]
pub struct CoxDesign {
    pub feature_names: Vec<String>,
    pub reference_levels: Vec<Option<String>>,
    pub data: SurvivalData,
}

impl CoxDesign {
    pub fn build(labeled: &LabeledDataset) -> Result<Self> {
        let n = labeled.len();
        let mut values = Vec::with_capacity(n * 3);
        for subject in labeled.subjects() {
            values.push(indicator(subject.treatment == TreatmentArm::Treatment));
            values.push(indicator(subject.residual == ResidualDisease::Residual));
            values.push(subject.record.age);
        }
        let covariates = Array2::from_shape_vec((n, 3), values)
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;

        let data = SurvivalData::new(labeled.times(), labeled.events(), covariates)?;

        Ok(Self {
            feature_names: vec![
                TreatmentArm::Treatment.label().to_string(),
                ResidualDisease::Residual.label().to_string(),
                "age".to_string(),
            ],
            reference_levels: vec![
                Some(TreatmentArm::Control.label().to_string()),
                Some(ResidualDisease::NoResidual.label().to_string()),
                None,
            ],
            data,
        })
    }
}

fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rx: i64, resid_ds: i64, fustat: i64) -> SubjectRecord {
        SubjectRecord {
            futime: 100.0,
            fustat,
            age: 60.0,
            resid_ds,
            rx,
            ecog_ps: 1,
        }
    }

    #[test]
    fn test_label_round_trip() {
        for code in [1, 2] {
            let arm = TreatmentArm::try_from(code).unwrap();
            assert_eq!(arm.label().parse::<TreatmentArm>().unwrap().code(), code);
            let resid = ResidualDisease::try_from(code).unwrap();
            assert_eq!(resid.label().parse::<ResidualDisease>().unwrap().code(), code);
        }
        assert_eq!(TreatmentArm::try_from(1).unwrap().label(), "control");
        assert_eq!(TreatmentArm::try_from(2).unwrap().label(), "treatment");
        assert_eq!(ResidualDisease::try_from(1).unwrap().label(), "no_residual");
        assert_eq!(ResidualDisease::try_from(2).unwrap().label(), "residual");
    }

    #[test]
    fn test_unknown_code_is_labeling_error() {
        let err = TreatmentArm::try_from(3).unwrap_err();
        assert!(matches!(err, SurvivalError::UnknownCode { column: "rx", code: 3 }));
        assert!("placebo".parse::<TreatmentArm>().is_err());
    }

    #[test]
    fn test_bad_row_aborts_labeling() {
        let dataset = Dataset::new(vec![record(1, 1, 1), record(2, 3, 0)]).unwrap();
        let err = LabeledDataset::from_dataset(&dataset, StatusCoding::default()).unwrap_err();
        assert!(matches!(err, SurvivalError::UnknownCode { column: "resid_ds", code: 3 }));
    }

    #[test]
    fn test_event_sentinel() {
        let dataset = Dataset::new(vec![record(1, 1, 1), record(2, 2, 0)]).unwrap();
        let labeled = LabeledDataset::from_dataset(&dataset, StatusCoding::default()).unwrap();
        assert_eq!(labeled.events(), vec![true, false]);

        let flipped = LabeledDataset::from_dataset(&dataset, StatusCoding { event: 0, censored: 1 }).unwrap();
        assert_eq!(flipped.events(), vec![false, true]);
        // source codes stay untouched
        assert_eq!(flipped.subjects()[0].record.fustat, 1);
    }

    #[test]
    fn test_status_outside_coding_is_labeling_error() {
        let dataset = Dataset::new(vec![record(1, 1, 1), record(1, 2, 7), record(2, 2, 0)]).unwrap();
        let err = LabeledDataset::from_dataset(&dataset, StatusCoding::default()).unwrap_err();
        assert!(matches!(err, SurvivalError::UnknownCode { column: "fustat", code: 7 }));

        assert_eq!(StatusCoding::default().classify(1).unwrap(), true);
        assert_eq!(StatusCoding::default().classify(0).unwrap(), false);
        assert!(StatusCoding::default().classify(2).is_err());
    }

    #[test]
    fn test_design_matrix() {
        let dataset = Dataset::new(vec![record(1, 2, 1), record(2, 1, 0)]).unwrap();
        let labeled = LabeledDataset::from_dataset(&dataset, StatusCoding::default()).unwrap();
        let design = CoxDesign::build(&labeled).unwrap();
        assert_eq!(design.feature_names, vec!["treatment", "residual", "age"]);
        let x = design.data.covariates();
        assert_eq!(x.row(0).to_vec(), vec![0.0, 1.0, 60.0]);
        assert_eq!(x.row(1).to_vec(), vec![1.0, 0.0, 60.0]);
    }
}
