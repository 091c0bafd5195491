//! Numeric core for isotope-ratio calibration and quantification.
//!
//! The crate ingests heterogeneous delimited instrument exports, aggregates
//! replicate readings per sample, fits linear calibration curves against a
//! registry of reference standards and quantifies unknown samples with a
//! propagated uncertainty. See [`pipeline::run`] for the one-call entry
//! point and [`data`] for the module map.

pub mod aggregate;
pub mod calibrate;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod quantify;
pub mod registry;
pub mod stats;

pub use data::loader::{ColumnAliases, Ingested};
pub use data::model::{
    CalibrationCurve, Channel, ChannelQuant, ChannelStats, Measurement, Quality, QuantifiedResult,
    SampleAggregate,
};
pub use error::{IngestError, Warning};
pub use pipeline::{RunOptions, RunReport};
pub use registry::{StandardRegistry, DEFAULT_STANDARDS};
