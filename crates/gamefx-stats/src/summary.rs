//! Summary statistics for samples of observations.
//!
//! These are the building blocks of the grouped aggregation tables: each
//! table cell is one [`SummaryStats`] computed over the non-missing values
//! that fell into the cell.
//!
//! The standard error follows the usual definition, sample standard
//! deviation divided by the square root of the count. Below two
//! observations the spread of a sample is undefined, so `std_dev` and
//! `std_err` are reported as NaN rather than zero: a NaN propagates
//! visibly into downstream tables, a silent zero would masquerade as a
//! perfectly precise estimate.

/// Summary statistics for a sample of `f64` observations.
///
/// # Examples
///
/// ```
/// use gamefx_stats::summary::SummaryStats;
///
/// let stats = SummaryStats::new([1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
/// assert_eq!(stats.count, 5);
/// assert_eq!(stats.mean, 3.0);
/// assert!((stats.std_err - stats.std_dev / 5.0_f64.sqrt()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    /// Number of observations in the sample.
    pub count: usize,
    /// Arithmetic mean of the sample.
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator). NaN when `count < 2`.
    pub std_dev: f64,
    /// Standard error of the mean (`std_dev / sqrt(count)`). NaN when `count < 2`.
    pub std_err: f64,
}

impl SummaryStats {
    /// Computes summary statistics over a set of values.
    ///
    /// # Returns
    ///
    /// * `Some(SummaryStats)` - if the sample contains at least one value
    /// * `None` - if the sample is empty
    ///
    /// A single-value sample has a defined mean but NaN standard deviation
    /// and standard error.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let values = values.into_iter().collect::<Vec<_>>();
        let count = values.len();
        if count == 0 {
            return None;
        }

        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;

        let (std_dev, std_err) = if count < 2 {
            (f64::NAN, f64::NAN)
        } else {
            let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            let std_dev = (ss / (n - 1.0)).sqrt();
            (std_dev, std_dev / n.sqrt())
        };

        Some(Self {
            count,
            mean,
            std_dev,
            std_err,
        })
    }

    /// Whether the standard error of this sample is undefined (`count < 2`).
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.count < 2
    }
}

/// Computes the median of a set of values.
///
/// The values are sorted internally; for an even count the two central
/// values are averaged.
///
/// # Returns
///
/// * `Some(median)` - if the sample contains at least one value
/// * `None` - if the sample is empty
///
/// # Examples
///
/// ```
/// use gamefx_stats::summary::median;
///
/// assert_eq!(median([3.0, 1.0, 2.0]), Some(2.0));
/// assert_eq!(median([4.0, 1.0, 2.0, 3.0]), Some(2.5));
/// assert_eq!(median(std::iter::empty()), None);
/// ```
#[must_use]
pub fn median<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut values = values.into_iter().collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample() {
        assert!(SummaryStats::new(std::iter::empty()).is_none());
    }

    #[test]
    fn test_single_value_has_nan_spread() {
        let stats = SummaryStats::new([42.0]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 42.0);
        assert!(stats.std_dev.is_nan());
        assert!(stats.std_err.is_nan());
        assert!(stats.is_undefined());
    }

    #[test]
    fn test_std_err_is_sd_over_sqrt_n() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = SummaryStats::new(values).unwrap();
        assert_eq!(stats.mean, 5.0);
        // Sample variance of this classic dataset is 32/7.
        let expected_sd = (32.0_f64 / 7.0).sqrt();
        assert!((stats.std_dev - expected_sd).abs() < 1e-12);
        assert!((stats.std_err - expected_sd / 8.0_f64.sqrt()).abs() < 1e-12);
        assert!(!stats.is_undefined());
    }

    #[test]
    fn test_two_values_have_defined_std_err() {
        let stats = SummaryStats::new([1.0, 3.0]).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 2.0);
        assert!((stats.std_dev - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(stats.std_err.is_finite());
    }

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median([5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median([4.0, 2.0, 3.0, 1.0]), Some(2.5));
        assert_eq!(median([7.0]), Some(7.0));
    }
}
