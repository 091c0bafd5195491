//! Quantification Engine: applies calibration curves to unknown samples and
//! propagates a combined uncertainty.
//!
//! The uncertainty is a simplified quadrature over three independent terms:
//!
//! ```text
//! u = sqrt( (s̄·SD_meas)² + RSE̅² + spread² )
//! ```
//!
//! where `s̄` is the mean absolute slope of the applicable curves, `SD_meas`
//! the sample's replicate SD, `RSE̅` the mean residual standard error of the
//! curves, and `spread` the SD of the per-curve calibrated values. Terms
//! whose input is undefined (single replicate, exact 2-point fits, a single
//! curve) contribute zero. This deliberately ignores slope/intercept
//! covariance; the cross terms are negligible at typical calibration spans.

use crate::data::model::{
    CalibrationCurve, Channel, ChannelQuant, CurveValue, PerChannel, QuantifiedResult,
    SampleAggregate,
};
use crate::error::Warning;
use crate::stats;

/// How per-curve values are combined into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Weighting {
    /// Plain mean over the applicable curves.
    #[default]
    Uniform,
    /// Weight each curve by `1 / RSE²`. Falls back to uniform when any
    /// applicable curve has no residual SE (exact 2-point fits).
    InverseVariance,
}

#[derive(Debug, Clone, Default)]
pub struct QuantifyOptions {
    pub weighting: Weighting,
}

/// Calibrated results plus coverage warnings.
#[derive(Debug, Clone, Default)]
pub struct Quantification {
    pub results: Vec<QuantifiedResult>,
    pub warnings: Vec<Warning>,
}

/// A curve applies to a sample when either side carries no session tag or
/// the tags match.
fn applies(curve: &CalibrationCurve, sample: &SampleAggregate, channel: Channel) -> bool {
    curve.channel == channel
        && match (&curve.session, &sample.session) {
            (Some(c), Some(s)) => c == s,
            _ => true,
        }
}

/// Quantify every unknown in `unknowns` against the applicable curves.
///
/// Results keep the input order. A channel with measurements but no
/// applicable curve raises [`Warning::NoCurveCoverage`] and stays empty; a
/// channel the sample was never measured on stays empty silently.
pub fn quantify(
    unknowns: &[&SampleAggregate],
    curves: &[CalibrationCurve],
    options: &QuantifyOptions,
) -> Quantification {
    let mut out = Quantification::default();

    for sample in unknowns {
        let mut channels = PerChannel::<Option<ChannelQuant>>::default();
        for channel in Channel::ALL {
            let Some(measured) = sample.stats(channel) else {
                continue;
            };
            let applicable: Vec<&CalibrationCurve> = curves
                .iter()
                .filter(|c| applies(c, sample, channel))
                .collect();
            if applicable.is_empty() {
                out.warnings.push(Warning::NoCurveCoverage {
                    sample: sample.id.clone(),
                    channel,
                });
                continue;
            }

            let per_curve: Vec<CurveValue> = applicable
                .iter()
                .map(|c| CurveValue {
                    curve: c.id.clone(),
                    value: c.apply(measured.mean),
                })
                .collect();
            let values: Vec<f64> = per_curve.iter().map(|v| v.value).collect();

            let weights = curve_weights(&applicable, options.weighting);
            let value = weighted_mean(&values, &weights);

            let spread = stats::sample_sd(&values).unwrap_or(0.0);
            let slope_term = {
                let mean_abs_slope = applicable.iter().map(|c| c.slope.abs()).sum::<f64>()
                    / applicable.len() as f64;
                mean_abs_slope * measured.sd.unwrap_or(0.0)
            };
            let rse_term = {
                let rses: Vec<f64> = applicable.iter().filter_map(|c| c.residual_se).collect();
                stats::mean(&rses).unwrap_or(0.0)
            };
            let uncertainty =
                (slope_term.powi(2) + rse_term.powi(2) + spread.powi(2)).sqrt();

            *channels.get_mut(channel) = Some(ChannelQuant {
                value,
                uncertainty,
                spread,
                per_curve,
            });
        }
        out.results.push(QuantifiedResult {
            id: sample.id.clone(),
            session: sample.session.clone(),
            channels,
        });
    }

    log::info!(
        "quantified {} sample(s) against {} curve(s), {} coverage warning(s)",
        out.results.len(),
        curves.len(),
        out.warnings.len()
    );
    out
}

fn curve_weights(curves: &[&CalibrationCurve], weighting: Weighting) -> Vec<f64> {
    match weighting {
        Weighting::Uniform => vec![1.0; curves.len()],
        Weighting::InverseVariance => {
            let inverse: Option<Vec<f64>> = curves
                .iter()
                .map(|c| match c.residual_se {
                    Some(rse) if rse > 0.0 => Some(1.0 / (rse * rse)),
                    _ => None,
                })
                .collect();
            inverse.unwrap_or_else(|| vec![1.0; curves.len()])
        }
    }
}

fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total
}
