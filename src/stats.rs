//! Summary statistics and the ordinary least-squares line fit.
//!
//! Degree is fixed at 1 everywhere in this crate, so the fit uses the
//! closed-form normal equations rather than a linear-algebra backend.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bessel-corrected (n − 1) sample standard deviation; `None` below two
/// values, where the statistic is undefined.
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// An ordinary least-squares line `y = slope·x + intercept`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// 1 − SS_res/SS_tot, clamped to [0, 1]; defined as 1.0 when the
    /// dependent values have zero variance.
    pub r_squared: f64,
    /// `y - ŷ` per input point, in input order.
    pub residuals: Vec<f64>,
    /// `sqrt(SS_res / (n − 2))`; `None` for the exact two-point fit.
    pub residual_se: Option<f64>,
}

/// Fit a line through `(x, y)` pairs.
///
/// Returns `None` when fewer than two points are given or the independent
/// axis has zero variance (undefined slope); degenerate inputs are the
/// caller's warning to raise, not a panic and not a made-up line.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len();
    if n < 2 {
        return None;
    }

    let x_mean = mean(x)?;
    let y_mean = mean(y)?;
    let sxx: f64 = x.iter().map(|xi| (xi - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - x_mean) * (yi - y_mean))
        .sum();

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let residuals: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| yi - (slope * xi + intercept))
        .collect();
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let ss_tot: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();

    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).max(0.0)
    };
    let residual_se = (n > 2).then(|| (ss_res / (n - 2) as f64).sqrt());

    Some(LineFit {
        slope,
        intercept,
        r_squared,
        residuals,
        residual_se,
    })
}
