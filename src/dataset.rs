//! Loading and exporting the ovarian cancer trial table.
//!
//! The table is the classic 26-patient ovarian cancer trial (Edmonson et al.)
//! comparing two chemotherapy arms. A copy ships inside the binary so a run
//! needs no external resources; [`Dataset::from_path`] reads the same schema
//! from disk.

use std::fmt;
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Result, SurvivalError};

const EMBEDDED_OVARIAN: &str = include_str!("../data/ovarian.csv");

/// one patient row, exactly as stored in the source table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubjectRecord {
    /// follow-up time in days
    pub futime: f64,
    /// follow-up status code (event vs censored, see `StatusCoding`)
    pub fustat: i64,
    pub age: f64,
    /// residual disease code (1 = none, 2 = present)
    pub resid_ds: i64,
    /// treatment arm code (1 = control, 2 = treatment)
    pub rx: i64,
    /// ECOG performance score
    pub ecog_ps: i64,
}

/// columns of the source table, in their original order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Futime,
    Fustat,
    Age,
    ResidDs,
    Rx,
    EcogPs,
}

impl Column {
    pub const ORIGINAL: [Column; 6] = [
        Column::Futime,
        Column::Fustat,
        Column::Age,
        Column::ResidDs,
        Column::Rx,
        Column::EcogPs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Futime => "futime",
            Self::Fustat => "fustat",
            Self::Age => "age",
            Self::ResidDs => "resid_ds",
            Self::Rx => "rx",
            Self::EcogPs => "ecog_ps",
        }
    }

    fn format(self, record: &SubjectRecord) -> String {
        match self {
            Self::Futime => record.futime.to_string(),
            Self::Fustat => record.fustat.to_string(),
            Self::Age => record.age.to_string(),
            Self::ResidDs => record.resid_ds.to_string(),
            Self::Rx => record.rx.to_string(),
            Self::EcogPs => record.ecog_ps.to_string(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// immutable set of subject records
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<SubjectRecord>,
}

impl Dataset {
    pub fn new(records: Vec<SubjectRecord>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if !record.futime.is_finite() || record.futime < 0.0 {
                return Err(SurvivalError::invalid_survival_data(format!(
                    "row {row}: follow-up time {} must be finite and non-negative",
                    record.futime
                )));
            }
        }
        Ok(Self { records })
    }

    /// the bundled ovarian trial table
    pub fn ovarian() -> Result<Self> {
        let dataset = Self::from_reader(EMBEDDED_OVARIAN.as_bytes())?;
        info!("loaded embedded ovarian dataset ({} subjects)", dataset.len());
        Ok(dataset)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SurvivalError::MissingDataset {
                path: path.display().to_string(),
            });
        }
        let file = std::fs::File::open(path)?;
        let dataset = Self::from_reader(file)?;
        info!("loaded {} subjects from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let records = csv_reader
            .deserialize()
            .collect::<std::result::Result<Vec<SubjectRecord>, csv::Error>>()?;
        debug!("parsed {} csv rows", records.len());
        Self::new(records)
    }

    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// write original columns w/ header, no index column
    pub fn export(&self, path: &Path) -> Result<()> {
        self.export_columns(path, &Column::ORIGINAL)
    }

    /// write the given columns in the given order
    pub fn export_columns(&self, path: &Path, columns: &[Column]) -> Result<()> {
        if columns.is_empty() {
            return Err(SurvivalError::invalid_parameter("columns", "[]"));
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(columns.iter().map(|c| c.name()))?;
        for record in &self.records {
            writer.write_record(columns.iter().map(|c| c.format(record)))?;
        }
        writer.flush()?;
        info!("exported {} rows to {}", self.records.len(), path.display());
        Ok(())
    }
}
