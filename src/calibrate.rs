//! Calibration Engine: matches aggregates against the standard registry and
//! fits one least-squares line per channel (and per session group).
//!
//! Orientation is fixed crate-wide: the measured mean is the independent
//! variable and the accepted reference value the dependent one, so applying a
//! curve is `calibrated = slope × measured + intercept` with no inversion.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::data::model::{CalibrationCurve, Channel, CurvePoint, Measurement, SampleAggregate};
use crate::error::Warning;
use crate::registry::StandardRegistry;
use crate::stats;

/// Caller-side knobs for curve fitting.
///
/// Flagged standards are never dropped implicitly; excluding one is the
/// caller's explicit decision, by normalized name.
#[derive(Debug, Clone, Default)]
pub struct CalibrationOptions {
    pub exclude: BTreeSet<String>,
}

/// Curves plus the warnings for everything that could not be fitted.
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    pub curves: Vec<CalibrationCurve>,
    pub warnings: Vec<Warning>,
}

/// Fit calibration curves from the standard aggregates in `aggregates`.
///
/// Aggregates whose normalized identifier matches a registry entry are the
/// standards; everything else is left for quantification. One curve is
/// fitted per channel and per session group (`None` session = one group).
/// Degenerate groups produce warnings, never a fabricated fit.
pub fn calibrate(
    aggregates: &[SampleAggregate],
    registry: &StandardRegistry,
    options: &CalibrationOptions,
) -> Calibration {
    let standards: Vec<&SampleAggregate> = aggregates
        .iter()
        .filter(|a| registry.lookup(&a.key).is_some())
        .collect();

    let mut out = Calibration::default();
    if standards.is_empty() {
        out.warnings.push(Warning::InsufficientData {
            context: "calibration".to_string(),
            detail: "no sample matches a registry standard".to_string(),
        });
        return out;
    }

    // Session groups in first-seen order, so curve labels are stable.
    let mut sessions: Vec<Option<String>> = Vec::new();
    for s in &standards {
        if !sessions.contains(&s.session) {
            sessions.push(s.session.clone());
        }
    }

    for (group_no, session) in sessions.iter().enumerate() {
        let label = format!("cal{}", group_no + 1);
        let in_group: Vec<&&SampleAggregate> = standards
            .iter()
            .filter(|s| s.session == *session)
            .collect();

        for channel in Channel::ALL {
            let context = format!("{label} {channel}");

            // Repeated standards within a group are averaged first, the way
            // repeated standard blocks are treated in the lab workbook.
            let mut by_standard: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for agg in &in_group {
                if options.exclude.contains(&agg.key) {
                    continue;
                }
                if let Some(stats) = agg.stats(channel) {
                    by_standard.entry(&agg.key).or_default().push(stats.mean);
                }
            }

            let mut points: Vec<(String, f64, f64)> = Vec::new();
            for (name, means) in &by_standard {
                // Entries always hold ≥ 1 mean, so this cannot fail.
                let Some(measured) = stats::mean(means) else {
                    continue;
                };
                let Some(standard) = registry.lookup(name) else {
                    continue;
                };
                points.push((name.to_string(), measured, standard.reference(channel)));
            }

            if points.len() < 2 {
                out.warnings.push(Warning::InsufficientData {
                    context,
                    detail: format!("{} standard point(s), need at least 2", points.len()),
                });
                continue;
            }

            let distinct_references = points
                .iter()
                .map(|(_, _, r)| r.to_bits())
                .collect::<BTreeSet<_>>()
                .len();
            if distinct_references < 2 {
                out.warnings.push(Warning::InsufficientData {
                    context,
                    detail: "all reference values are identical".to_string(),
                });
                continue;
            }

            let measured: Vec<f64> = points.iter().map(|(_, m, _)| *m).collect();
            let references: Vec<f64> = points.iter().map(|(_, _, r)| *r).collect();
            let Some(fit) = stats::fit_line(&measured, &references) else {
                out.warnings.push(Warning::InsufficientData {
                    context,
                    detail: "zero variance on the measured axis, slope undefined".to_string(),
                });
                continue;
            };

            let curve_points: Vec<CurvePoint> = points
                .iter()
                .zip(&fit.residuals)
                .map(|((standard, measured, reference), residual)| CurvePoint {
                    standard: standard.clone(),
                    measured: *measured,
                    reference: *reference,
                    residual: *residual,
                })
                .collect();

            log::debug!(
                "{label} {channel}: slope {:.6}, intercept {:.6}, R² {:.6} from {}",
                fit.slope,
                fit.intercept,
                fit.r_squared,
                points.iter().map(|(n, _, _)| n.as_str()).join(", "),
            );

            out.curves.push(CalibrationCurve {
                id: label.clone(),
                channel,
                session: session.clone(),
                slope: fit.slope,
                intercept: fit.intercept,
                r_squared: fit.r_squared,
                residual_se: fit.residual_se,
                standards: points
                    .iter()
                    .map(|(n, _, _)| n.clone())
                    .sorted()
                    .dedup()
                    .collect(),
                points: curve_points,
            });
        }
    }

    log::info!(
        "calibration: {} curve(s) over {} session group(s), {} warning(s)",
        out.curves.len(),
        sessions.len(),
        out.warnings.len()
    );
    out
}

/// Derive session tags from repeated standard blocks, for files measured as
/// `NIVOLET, ORMEA, SSW, …unknowns…, NIVOLET, ORMEA, SSW, …` without an
/// explicit session column.
///
/// Runs before aggregation, on the raw measurement sequence. Consecutive
/// measurements of the same standard form one occurrence; the base pattern
/// length is the number of distinct standards seen before the first repeat,
/// and occurrences are then chunked into blocks of that length and tagged
/// `cal1`, `cal2`, …. Unknowns are left untagged (they quantify against
/// every curve). Returns the block count.
///
/// This is an opt-in helper: the engines themselves only ever group by the
/// explicit session key.
pub fn assign_sessions_from_blocks(
    measurements: &mut [Measurement],
    registry: &StandardRegistry,
) -> usize {
    // Occurrences of standards, each a run of consecutive measurements
    // sharing a normalized identifier.
    let mut occurrences: Vec<(String, Vec<usize>)> = Vec::new();
    let mut previous_key: Option<String> = None;
    for (i, m) in measurements.iter().enumerate() {
        let key = crate::registry::normalize_name(&m.sample);
        if registry.lookup(&key).is_some() {
            if previous_key.as_deref() == Some(key.as_str()) {
                // Same standard as the measurement before: same occurrence.
                if let Some((_, indices)) = occurrences.last_mut() {
                    indices.push(i);
                }
            } else {
                occurrences.push((key.clone(), vec![i]));
            }
        }
        previous_key = Some(key);
    }
    if occurrences.is_empty() {
        return 0;
    }

    let mut seen: Vec<&str> = Vec::new();
    for (key, _) in &occurrences {
        if seen.contains(&key.as_str()) {
            break;
        }
        seen.push(key);
    }
    let pattern_len = seen.len();

    let mut blocks = 0;
    for (position, (_, indices)) in occurrences.iter().enumerate() {
        let block = position / pattern_len;
        blocks = blocks.max(block + 1);
        for &i in indices {
            measurements[i].session = Some(format!("cal{}", block + 1));
        }
    }
    blocks
}
