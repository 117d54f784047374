//! Grouped descriptive aggregation of trial records.
//!
//! This module collapses trial-level records into one summary cell (mean,
//! standard error, count) per combination of grouping keys. It backs the
//! descriptive tables handed to the plotting collaborator and the sanity
//! checks run before modeling.
//!
//! # Contract
//!
//! - Missing values are excluded from the cell, never treated as zero
//! - A cell with fewer than two values reports a NaN standard error and is
//!   surfaced through [`AggregateTable::undefined_cells`]; it is not an
//!   error and it is never coerced to zero
//! - Output ordering is deterministic: cells are held in a `BTreeMap` and
//!   iterate lexicographically by key
//!
//! # Nested two-stage aggregation
//!
//! Response times are summarized per subject first (one median per subject
//! per cell), then across subjects (mean and SE of those medians). The
//! first stage's single output row per subject is the second stage's input
//! row, and the second stage is the ordinary aggregator applied
//! recursively — both stages share one contract.
//!
//! # Examples
//!
//! ```
//! use gamefx_analysis::aggregate::AggregateTable;
//!
//! let records = [("a", Some(1.0)), ("a", Some(3.0)), ("b", Some(5.0))];
//! let table = AggregateTable::collect_by_group(&records, |r| r.0, |r| r.1);
//!
//! assert_eq!(table.cells["a"].mean, 2.0);
//! assert_eq!(table.cells["a"].count, 2);
//! assert!(table.cells["b"].std_err.is_nan());
//! ```

use std::collections::BTreeMap;

use gamefx_stats::summary::{SummaryStats, median};

/// One aggregated cell: mean, standard error, and count over the
/// non-missing values that fell into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSummary {
    pub mean: f64,
    /// Sample standard deviation over the square root of the count. NaN
    /// when fewer than two values were observed.
    pub std_err: f64,
    pub count: usize,
}

impl CellSummary {
    fn from_values(values: &[f64]) -> Self {
        SummaryStats::new(values.iter().copied()).map_or(
            Self {
                mean: f64::NAN,
                std_err: f64::NAN,
                count: 0,
            },
            |stats| Self {
                mean: stats.mean,
                std_err: stats.std_err,
                count: stats.count,
            },
        )
    }
}

/// Statistic used to collapse each subject's values in the first stage of
/// a nested aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatistic {
    Mean,
    /// Robust choice for right-skewed measurements such as response times.
    Median,
}

/// Aggregated summary cells keyed by a grouping tuple, lexicographically
/// ordered.
#[derive(Debug, Clone)]
pub struct AggregateTable<K> {
    pub cells: BTreeMap<K, CellSummary>,
}

impl<K: Ord> AggregateTable<K> {
    /// Collapses records into one cell per observed key. `value` returns
    /// `None` for a missing measurement; missing values are excluded from
    /// the cell but the key still appears if any record produced it.
    pub fn collect_by_group<R, F, G>(records: &[R], mut key: F, mut value: G) -> Self
    where
        F: FnMut(&R) -> K,
        G: FnMut(&R) -> Option<f64>,
    {
        let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
        for record in records {
            let entry = groups.entry(key(record)).or_default();
            if let Some(v) = value(record) {
                entry.push(v);
            }
        }

        let cells = groups
            .into_iter()
            .map(|(k, values)| (k, CellSummary::from_values(&values)))
            .collect();
        Self { cells }
    }

    /// Two-stage nested aggregation: stage one collapses each
    /// (cell, subject) group to a single value with `stat`, stage two runs
    /// the ordinary aggregator across the per-subject rows.
    pub fn collect_within_subject<R, S, F, SF, G>(
        records: &[R],
        mut cell_key: F,
        mut subject_key: SF,
        mut value: G,
        stat: SubjectStatistic,
    ) -> Self
    where
        K: Clone,
        S: Ord,
        F: FnMut(&R) -> K,
        SF: FnMut(&R) -> S,
        G: FnMut(&R) -> Option<f64>,
    {
        let mut per_subject: BTreeMap<(K, S), Vec<f64>> = BTreeMap::new();
        for record in records {
            let entry = per_subject
                .entry((cell_key(record), subject_key(record)))
                .or_default();
            if let Some(v) = value(record) {
                entry.push(v);
            }
        }

        // One row per (cell, subject); subjects with only missing values
        // contribute no row.
        let collapsed: Vec<(K, f64)> = per_subject
            .into_iter()
            .filter_map(|((k, _), values)| {
                let reduced = match stat {
                    SubjectStatistic::Mean => {
                        SummaryStats::new(values.iter().copied()).map(|s| s.mean)
                    }
                    SubjectStatistic::Median => median(values.iter().copied()),
                };
                reduced.map(|v| (k, v))
            })
            .collect();

        Self::collect_by_group(&collapsed, |(k, _)| k.clone(), |(_, v)| Some(*v))
    }

    /// Keys whose standard error is undefined (fewer than two values).
    /// These are reported alongside the table, never dropped from it.
    pub fn undefined_cells(&self) -> impl Iterator<Item = &K> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.count < 2)
            .map(|(k, _)| k)
    }
}
