//! Error types.
//!
//! Configuration errors are fail-fast and surface from [`ShiftDomain::new`].
//! Solve-time problems degrade to fallbacks inside the pipeline; the only
//! solve-time error that escapes is a failed refinement.
//!
//! [`ShiftDomain::new`]: crate::domain::ShiftDomain::new

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::SolveStatus;
use crate::domain::ShiftCategory;

/// Static configuration is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("roster is empty")]
    EmptyRoster,
    #[error("duplicate staff id '{0}'")]
    DuplicateStaff(String),
    #[error("duplicate shift code '{0}'")]
    DuplicateCode(String),
    #[error("no shift code has category {0:?}")]
    MissingCategory(ShiftCategory),
    #[error("more than one shift code has category {0:?}")]
    AmbiguousCategory(ShiftCategory),
    #[error("unknown shift code '{code}' referenced by {context}")]
    UnknownCode { code: String, context: String },
    #[error("unknown staff id '{id}' referenced by {context}")]
    UnknownStaff { id: String, context: String },
    #[error("pin of '{code}' for {staff} on day {day} contradicts {reason}")]
    PinConflict {
        staff: String,
        code: String,
        day: u32,
        reason: &'static str,
    },
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
}

/// The request file could not be read.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read request file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A solve phase did not produce a usable schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("refinement failed with solver status {status}")]
    RefinementFailed { status: SolveStatus },
}

/// Writing an output artifact failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to process CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to serialize schedule: {0}")]
    Json(#[from] serde_json::Error),
}
