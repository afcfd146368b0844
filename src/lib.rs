//! # ovarian survival
//!
//! survival analysis of the ovarian cancer trial data - kaplan-meier curves,
//! log-rank tests, cox regression and proportional-hazards checks
//!
//! ## what you get
//!
//! - kaplan-meier life tables w/ log(-log) confidence bands and medians
//! - k-sample log-rank test
//! - cox proportional hazards (efron or breslow ties, optional ridge)
//! - schoenfeld residual checks for the proportional-hazards assumption
//! - svg survival plots and a csv export of the source table
//!
//! ## quick start
//!
//! ```rust
//! use ovarian_survival::{CoxModel, SurvivalData};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // setup some survival data
//! let times = vec![1.0, 2.5, 3.2, 4.1, 5.0, 6.3];
//! let events = vec![true, false, true, true, false, true]; // true = died, false = censored
//! let covariates = Array2::from_shape_vec((6, 2), vec![
//!     1.0, 0.5,  // patient features
//!     0.0, 1.0,
//!     1.0, 0.0,
//!     0.0, 1.5,
//!     1.0, -0.5,
//!     0.0, 0.2,
//! ])?;
//! let data = SurvivalData::new(times, events, covariates)?;
//!
//! let mut model = CoxModel::new()
//!     .with_feature_names(vec!["treated".into(), "score".into()]);
//! model.fit(&data)?;
//!
//! // get risk scores
//! let risk_scores = model.predict(data.covariates())?;
//! assert_eq!(risk_scores.len(), 6);
//! # Ok(())
//! # }
//! ```
//!
//! the whole analysis in one call:
//!
//! ```no_run
//! use ovarian_survival::{pipeline, AnalysisConfig, DataSource};
//!
//! # fn main() -> ovarian_survival::Result<()> {
//! let report = pipeline::run(&AnalysisConfig::default(), &DataSource::Embedded)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod assumptions;
pub mod config;
pub mod data;
pub mod dataset;
pub mod distributions;
pub mod error;
pub mod kaplan_meier;
pub mod linalg;
pub mod logrank;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod pipeline;
pub mod plot;
pub mod preprocess;
pub mod report;

pub use assumptions::{ProportionalHazardsTest, SchoenfeldResiduals};
pub use config::{AnalysisConfig, PlotConfig, Ties, TimeTransform};
pub use data::SurvivalData;
pub use dataset::{Column, Dataset, SubjectRecord};
pub use error::{Result, Stage, SurvivalError};
pub use kaplan_meier::{GroupedKaplanMeier, KaplanMeierCurve};
pub use logrank::LogRankTest;
pub use model::{CoxModel, CoxModelSummary};
pub use pipeline::{AnalysisReport, DataSource};
pub use preprocess::{CoxDesign, LabeledDataset, ResidualDisease, StatusCoding, TreatmentArm};
