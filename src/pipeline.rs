//! Batch pipeline: ingestion → aggregation → calibration → quantification.
//!
//! Stages run strictly in sequence over in-memory data. Per-file failures
//! are fatal for that file only; everything recoverable travels as warnings
//! in the report, so one bad row or one unfittable session never aborts a
//! run.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::aggregate::{self, AggregateOptions};
use crate::calibrate::{self, CalibrationOptions};
use crate::data::loader::{self, ColumnAliases};
use crate::data::model::{CalibrationCurve, Measurement, QuantifiedResult, SampleAggregate};
use crate::error::Warning;
use crate::quantify::{self, QuantifyOptions};
use crate::registry::StandardRegistry;

/// Options for a full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub aliases: ColumnAliases,
    pub aggregate: AggregateOptions,
    pub calibration: CalibrationOptions,
    pub quantify: QuantifyOptions,
    /// When no sample carries a session tag, derive tags from repeated
    /// standard blocks before calibrating. Off by default.
    pub detect_sessions: bool,
}

/// Everything a run produced, in input order throughout. Serializable as a
/// whole so the export collaborator can take the three tables at once.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub aggregates: Vec<SampleAggregate>,
    pub curves: Vec<CalibrationCurve>,
    pub results: Vec<QuantifiedResult>,
    pub warnings: Vec<Warning>,
    /// True when the built-in standards stood in for a loaded source.
    pub used_default_standards: bool,
}

/// Run the numeric stages over already-parsed measurements.
pub fn run(
    measurements: &[Measurement],
    registry: &StandardRegistry,
    options: &RunOptions,
) -> RunReport {
    let mut measurements = measurements.to_vec();
    if options.detect_sessions && measurements.iter().all(|m| m.session.is_none()) {
        let blocks = calibrate::assign_sessions_from_blocks(&mut measurements, registry);
        if blocks > 1 {
            log::info!("detected {blocks} repeated standard blocks");
        }
    }

    let aggregates = aggregate::aggregate(&measurements, &options.aggregate);

    let calibration = calibrate::calibrate(&aggregates, registry, &options.calibration);

    let unknowns: Vec<&SampleAggregate> = aggregates
        .iter()
        .filter(|a| registry.lookup(&a.key).is_none())
        .collect();
    let quantification = quantify::quantify(&unknowns, &calibration.curves, &options.quantify);

    let mut warnings = calibration.warnings;
    warnings.extend(quantification.warnings);

    log::info!(
        "run complete: {} aggregates, {} curves, {} results, {} warnings",
        aggregates.len(),
        calibration.curves.len(),
        quantification.results.len(),
        warnings.len()
    );

    RunReport {
        aggregates,
        curves: calibration.curves,
        results: quantification.results,
        warnings,
        used_default_standards: registry.used_defaults(),
    }
}

/// Ingest one measurement file and run the full pipeline over it.
///
/// Ingestion errors are fatal for the file and carry its path; row-level
/// parse warnings join the run's warning list instead.
pub fn analyze_file(
    path: &Path,
    registry: &StandardRegistry,
    options: &RunOptions,
) -> anyhow::Result<RunReport> {
    let ingested = loader::load_file(path, &options.aliases)
        .with_context(|| format!("analyzing {}", path.display()))?;

    let mut report = run(&ingested.measurements, registry, options);
    let mut warnings = ingested.warnings;
    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Channel;
    use approx::assert_relative_eq;

    fn m(sample: &str, channel: Channel, value: f64) -> Measurement {
        Measurement {
            sample: sample.to_string(),
            channel,
            value,
            replicate: None,
            session: None,
        }
    }

    #[test]
    fn standards_calibrate_and_unknowns_quantify_in_one_pass() {
        let measurements = vec![
            m("NIVOLET", Channel::Delta18O, -20.0),
            m("SSW", Channel::Delta18O, -1.0),
            m("LAKE-1", Channel::Delta18O, -10.5),
        ];
        let registry = StandardRegistry::defaults();
        let report = run(&measurements, &registry, &RunOptions::default());

        assert_eq!(report.aggregates.len(), 3);
        assert_eq!(report.curves.len(), 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].id, "LAKE-1");
        assert!(report.used_default_standards);

        // The standard is not quantified as an unknown.
        assert!(!report.results.iter().any(|r| r.id == "NIVOLET"));

        let curve = &report.curves[0];
        let quant = report.results[0].quant(Channel::Delta18O).unwrap();
        assert_relative_eq!(quant.value, curve.apply(-10.5), epsilon = 1e-12);
    }

    #[test]
    fn warnings_accumulate_without_aborting() {
        // Only one standard: calibration warns per channel, quantification
        // warns about the uncovered unknown, and the run still returns.
        let measurements = vec![
            m("SSW", Channel::Delta18O, -1.0),
            m("LAKE-1", Channel::Delta18O, -10.5),
        ];
        let report = run(&measurements, &StandardRegistry::defaults(), &RunOptions::default());

        assert!(report.curves.is_empty());
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].quant(Channel::Delta18O).is_none());
        assert!(report.warnings.len() >= 2);
    }

    #[test]
    fn session_detection_is_opt_in() {
        let measurements = vec![
            m("NIVOLET", Channel::Delta18O, -20.0),
            m("SSW", Channel::Delta18O, -1.0),
            m("LAKE-1", Channel::Delta18O, -10.0),
            m("NIVOLET", Channel::Delta18O, -20.2),
            m("SSW", Channel::Delta18O, -1.2),
        ];
        let registry = StandardRegistry::defaults();

        // Off by default: the repeated standards pool into one curve.
        let plain = run(&measurements, &registry, &RunOptions::default());
        assert_eq!(plain.curves.len(), 1);
        assert!(plain.curves[0].session.is_none());

        // Opted in: two blocks, two curves, and the untagged unknown is
        // quantified against both.
        let detected = run(
            &measurements,
            &registry,
            &RunOptions {
                detect_sessions: true,
                ..Default::default()
            },
        );
        assert_eq!(detected.curves.len(), 2);
        assert_eq!(detected.curves[0].session.as_deref(), Some("cal1"));
        assert_eq!(detected.curves[1].session.as_deref(), Some("cal2"));
        let quant = detected.results[0].quant(Channel::Delta18O).unwrap();
        assert_eq!(quant.per_curve.len(), 2);
        assert!(quant.spread > 0.0);
    }

    #[test]
    fn missing_file_is_a_fatal_error_with_the_path_attached() {
        let err = analyze_file(
            Path::new("/nonexistent/run42.csv"),
            &StandardRegistry::defaults(),
            &RunOptions::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("run42.csv"));
    }
}
