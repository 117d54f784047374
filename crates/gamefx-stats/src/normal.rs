//! Standard normal distribution helpers.
//!
//! Coefficient tables report Wald z statistics; the p-values attached to
//! them come from the standard normal distribution. The CDF is computed
//! through a rational approximation of the error function
//! (Abramowitz & Stegun 7.1.26, absolute error below `1.5e-7`), which is
//! far below the precision at which p-values are ever read.

use std::f64::consts::SQRT_2;

/// Error function approximation (Abramowitz & Stegun 7.1.26).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));

    sign * (1.0 - poly * (-x * x).exp())
}

/// Cumulative distribution function of the standard normal distribution.
///
/// # Examples
///
/// ```
/// use gamefx_stats::normal::normal_cdf;
///
/// assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
/// assert!(normal_cdf(3.0) > 0.99);
/// ```
#[must_use]
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Two-sided p-value for a Wald z statistic.
///
/// Returns NaN for a NaN statistic (an undefined standard error propagates
/// instead of being coerced).
///
/// # Examples
///
/// ```
/// use gamefx_stats::normal::pvalue_z;
///
/// assert!((pvalue_z(0.0) - 1.0).abs() < 1e-12);
/// assert!(pvalue_z(5.0) < 1e-5);
/// ```
#[must_use]
pub fn pvalue_z(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}
