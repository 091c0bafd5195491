use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Channel – the two calibrated isotope axes
// ---------------------------------------------------------------------------

/// An isotope channel: the per-mille deviation of oxygen-18 or deuterium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Delta18O,
    Delta2H,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Delta18O, Channel::Delta2H];

    /// Typical instrument precision (‰) for this channel.
    ///
    /// A sample whose replicate spread exceeds a multiple of this is flagged
    /// by the aggregator. Values are the acceptance thresholds of the
    /// laboratory protocol: 0.08 ‰ for δ18O, 0.8 ‰ for δ2H.
    pub const fn precision(self) -> f64 {
        match self {
            Channel::Delta18O => 0.08,
            Channel::Delta2H => 0.8,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Delta18O => write!(f, "δ18O"),
            Channel::Delta2H => write!(f, "δ2H"),
        }
    }
}

/// A pair of per-channel slots, indexed by [`Channel`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerChannel<T> {
    pub d18o: T,
    pub d2h: T,
}

impl<T> PerChannel<T> {
    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Delta18O => &self.d18o,
            Channel::Delta2H => &self.d2h,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        match channel {
            Channel::Delta18O => &mut self.d18o,
            Channel::Delta2H => &mut self.d2h,
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement – one parsed instrument reading
// ---------------------------------------------------------------------------

/// A single raw instrument reading, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Sample identifier as written in the file.
    pub sample: String,
    pub channel: Channel,
    /// Raw value in ‰, finite by construction (the loader drops the rest).
    pub value: f64,
    /// Replicate (injection) index, when the file carries one.
    pub replicate: Option<u32>,
    /// Calibration-session tag passed through from ingestion. This is the
    /// grouping key for per-session curves; the engines never infer it.
    pub session: Option<String>,
}

// ---------------------------------------------------------------------------
// SampleAggregate – per-sample summary statistics
// ---------------------------------------------------------------------------

/// Quality flags computed by the aggregator. Flagged samples are carried
/// forward unchanged; only the flags differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Quality {
    /// Fewer replicates than the configured minimum.
    pub low_replicates: bool,
    /// Replicate SD above the allowed multiple of the channel precision.
    pub high_spread: bool,
}

impl Quality {
    pub fn is_flagged(self) -> bool {
        self.low_replicates || self.high_spread
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Mirrors the OK / NO condition column of the lab workbook.
        if self.is_flagged() {
            write!(f, "NO")
        } else {
            write!(f, "OK")
        }
    }
}

/// Summary statistics for one sample on one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f64,
    /// Bessel-corrected sample SD; `None` when only one replicate exists.
    pub sd: Option<f64>,
    /// Replicate count, always ≥ 1.
    pub n: usize,
    pub quality: Quality,
}

/// Per-sample aggregate over all replicates sharing an identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleAggregate {
    /// Identifier in its first-seen spelling, for display and export.
    pub id: String,
    /// Normalized identifier; equals the registry key for standards.
    pub key: String,
    pub session: Option<String>,
    /// A channel with zero valid replicates has no entry here.
    pub channels: PerChannel<Option<ChannelStats>>,
}

impl SampleAggregate {
    pub fn stats(&self, channel: Channel) -> Option<&ChannelStats> {
        self.channels.get(channel).as_ref()
    }
}

// ---------------------------------------------------------------------------
// CalibrationCurve – one linear fit per channel (and session group)
// ---------------------------------------------------------------------------

/// One fitted calibration point and its residual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurvePoint {
    pub standard: String,
    /// Measured mean on the raw instrument axis (‰).
    pub measured: f64,
    /// Accepted reference value (‰).
    pub reference: f64,
    /// `reference - predicted` at this point.
    pub residual: f64,
}

/// A linear map from raw instrument reading to accepted isotope value,
/// fitted with the measured mean as independent variable:
/// `calibrated = slope × measured + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationCurve {
    /// Curve label, `cal1`, `cal2`, …, shared by both channels of a session.
    pub id: String,
    pub channel: Channel,
    /// Session group this curve belongs to; `None` for a single-curve run.
    pub session: Option<String>,
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, clamped to [0, 1].
    pub r_squared: f64,
    /// Residual standard error of the fit; `None` for exact 2-point fits.
    pub residual_se: Option<f64>,
    /// Sorted, deduplicated names of the standards used.
    pub standards: Vec<String>,
    pub points: Vec<CurvePoint>,
}

impl CalibrationCurve {
    /// Map a raw measured value onto the calibrated scale.
    pub fn apply(&self, measured: f64) -> f64 {
        self.slope * measured + self.intercept
    }
}

// ---------------------------------------------------------------------------
// QuantifiedResult – calibrated values for unknowns
// ---------------------------------------------------------------------------

/// The calibrated value an individual curve produced for a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveValue {
    pub curve: String,
    pub value: f64,
}

/// Calibrated value for one unknown sample on one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelQuant {
    /// Mean (or weighted mean) of the per-curve calibrated values.
    pub value: f64,
    /// Propagated uncertainty, see [`crate::quantify`].
    pub uncertainty: f64,
    /// Sample SD across the applicable curves; 0 when fewer than two.
    pub spread: f64,
    pub per_curve: Vec<CurveValue>,
}

/// One unknown sample's calibrated result.
///
/// A channel only carries a value when at least one valid curve applied; the
/// run's warnings name the channels that had no coverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantifiedResult {
    pub id: String,
    pub session: Option<String>,
    pub channels: PerChannel<Option<ChannelQuant>>,
}

impl QuantifiedResult {
    pub fn quant(&self, channel: Channel) -> Option<&ChannelQuant> {
        self.channels.get(channel).as_ref()
    }
}
