//! Trial-record data structures for the learning experiment.
//!
//! One analysis pass (practice, post-test, survey) is a flat table of
//! trial records. Records are read-only inputs: they are deserialized once
//! by the caller and never mutated by the pipeline; every derived artifact
//! (centered covariates, aggregate tables, fitted models) is recomputed
//! per pass from these records.
//!
//! # Design factors
//!
//! Each record carries the three binary design factors of the experiment:
//!
//! - `gamified` - within-subject feedback condition, varies across blocks
//! - `group` - between-subject experimental arm, fixed per subject
//! - `order` - between-subject presentation order, fixed per subject
//!
//! The invariant that a subject has exactly one factor value per block is
//! a property of the upstream export; the design encoder surfaces
//! violations as level-count errors rather than silently modeling them.
//!
//! # Serialization
//!
//! All types implement `serde` traits for JSON loading:
//!
//! ```json
//! {
//!   "trials": [
//!     {
//!       "subject_id": "s01",
//!       "block": 1,
//!       "condition": "points+badges",
//!       "gamified": true,
//!       "group": "arithmetic",
//!       "order": "gamified-first",
//!       "item_id": "fact-17",
//!       "correct": true,
//!       "response_time_ms": 1840.0
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A full analysis-pass dataset of trial records.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrialCollection {
    /// All trial records of the pass.
    pub trials: Vec<TrialRecord>,
}

impl TrialCollection {
    /// Distinct subject ids, lexicographically ordered.
    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.trials.iter().map(|t| t.subject_id.as_str()).collect();
        set.into_iter().collect()
    }
}

/// One observed event: a practice trial, a post-test trial, or a survey
/// response. Immutable after load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrialRecord {
    /// Subject identifier.
    pub subject_id: String,
    /// Block number (1 or 2).
    pub block: u8,
    /// Condition label as presented (e.g., `points+badges`, `plain`).
    pub condition: String,
    /// Whether this record was collected under the gamified condition.
    pub gamified: bool,
    /// Between-subject experimental group arm.
    pub group: String,
    /// Between-subject presentation order (which arm came first).
    pub order: String,
    /// Item/fact identifier; present for trial-level records.
    #[serde(default)]
    pub item_id: Option<String>,
    /// Correctness; `None` for non-response items.
    #[serde(default)]
    pub correct: Option<bool>,
    /// Response time in milliseconds; `None` when no response was given.
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    /// Rating or score value for survey/practice contexts.
    #[serde(default)]
    pub rating: Option<f64>,
    /// Survey question label, when the record is a survey response.
    #[serde(default)]
    pub question: Option<String>,
}
