use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::data::model::Channel;

// ---------------------------------------------------------------------------
// Fatal errors – abort processing of one file, never the whole process
// ---------------------------------------------------------------------------

/// Failure to turn a measurement file into a `Measurement` sequence.
///
/// Any of these is fatal for the offending file only; the caller may retry
/// with another file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No candidate encoding decoded the file.
    #[error("cannot decode {path} with any candidate encoding")]
    Encoding { path: PathBuf },

    /// The file is not a delimited table we can make sense of.
    #[error("unparseable measurement file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The header parsed, but a required column role is missing.
    #[error("{path}: no column recognised as '{role}'")]
    Schema { path: PathBuf, role: String },
}

/// The external standards source could not be used.
///
/// Recovered locally: the registry falls back to its built-in defaults and
/// records that it did so. Loader collaborators produce this to describe why.
#[derive(Debug, Error)]
#[error("standards source unavailable: {0}")]
pub struct RegistrySourceError(pub String);

// ---------------------------------------------------------------------------
// Warnings – recoverable problems annotated on the run's outputs
// ---------------------------------------------------------------------------

/// A recoverable problem encountered during a run.
///
/// Bad rows, groups too small to fit, and unknowns no curve covers all end up
/// here instead of aborting the pipeline. The assembled result set always
/// contains whatever could be computed, paired with these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Warning {
    /// A row of the input file was dropped (or partially dropped).
    SkippedRow { line: u64, reason: String },
    /// A calibration curve could not be fitted for a channel/group.
    InsufficientData { context: String, detail: String },
    /// An unknown sample has no applicable curve for a channel.
    NoCurveCoverage { sample: String, channel: Channel },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SkippedRow { line, reason } => {
                write!(f, "row {line} skipped: {reason}")
            }
            Warning::InsufficientData { context, detail } => {
                write!(f, "no curve for {context}: {detail}")
            }
            Warning::NoCurveCoverage { sample, channel } => {
                write!(f, "sample '{sample}' has no applicable {channel} curve")
            }
        }
    }
}
