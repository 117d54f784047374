//! Statistical primitives for the gamefx analysis pipeline.
//!
//! This crate provides the small set of numerical tools the rest of the
//! workspace builds on:
//!
//! - **Summary statistics**: mean, sample standard deviation, and standard
//!   error for a set of observations
//! - **Medians**: robust central tendency for right-skewed measurements
//!   such as response times
//! - **Normal distribution helpers**: cumulative distribution function and
//!   two-sided z p-values for coefficient tables
//!
//! # Modules
//!
//! - [`summary`]: Summary statistics for aggregated cells
//! - [`normal`]: Standard normal CDF and Wald-test p-values
//!
//! # Examples
//!
//! ## Summarizing a sample
//!
//! ```
//! use gamefx_stats::summary::SummaryStats;
//!
//! let stats = SummaryStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
//! assert_eq!(stats.mean, 5.0);
//! assert_eq!(stats.count, 8);
//! ```
//!
//! ## Two-sided p-value for a z statistic
//!
//! ```
//! use gamefx_stats::normal::pvalue_z;
//!
//! let p = pvalue_z(1.96);
//! assert!((p - 0.05).abs() < 1e-3);
//! ```

pub mod normal;
pub mod summary;
