//! Structured fixed-effect and random-intercept descriptions.
//!
//! The model structure is a closed description, not a formula string:
//! every model the engine can fit is one of two fixed-effect structures
//! crossed with one of the random-intercept specs below. An ill-formed
//! model cannot be expressed, so the contract is checked at construction
//! time rather than at fit time.
//!
//! # The two fixed structures
//!
//! [`FixedEffects::GamifiedCrossed`] is the workhorse:
//!
//! ```text
//! response ~ gamified + gamified:group + gamified:order + gamified:group:order
//! ```
//!
//! Gamified is a within-subject manipulation; group and order are
//! between-subject counterbalancing arms that are only partially crossed
//! with it. They therefore enter *only* through interactions with
//! gamified: the design cannot cleanly estimate their main effects, but it
//! can test whether the gamified effect is modified by them.
//!
//! [`FixedEffects::BetweenOnly`] is the reduced fallback for outcomes
//! observed under a single gamified level (e.g., a question asked only in
//! the gamified condition), where every gamified term is degenerate:
//!
//! ```text
//! response ~ group + order + group:order
//! ```

use serde::{Deserialize, Serialize};

use crate::{design::DesignFactor, family::ResponseFamily};

/// A single fixed-effect term: the product of the named centered
/// covariates. The empty product is the intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTerm {
    /// Term label used in coefficient tables.
    pub name: &'static str,
    /// Centered covariates multiplied into this column.
    pub factors: &'static [DesignFactor],
}

const GAMIFIED_CROSSED_TERMS: &[FixedTerm] = &[
    FixedTerm {
        name: "(intercept)",
        factors: &[],
    },
    FixedTerm {
        name: "gamified",
        factors: &[DesignFactor::Gamified],
    },
    FixedTerm {
        name: "gamified:group",
        factors: &[DesignFactor::Gamified, DesignFactor::Group],
    },
    FixedTerm {
        name: "gamified:order",
        factors: &[DesignFactor::Gamified, DesignFactor::Order],
    },
    FixedTerm {
        name: "gamified:group:order",
        factors: &[
            DesignFactor::Gamified,
            DesignFactor::Group,
            DesignFactor::Order,
        ],
    },
];

const BETWEEN_ONLY_TERMS: &[FixedTerm] = &[
    FixedTerm {
        name: "(intercept)",
        factors: &[],
    },
    FixedTerm {
        name: "group",
        factors: &[DesignFactor::Group],
    },
    FixedTerm {
        name: "order",
        factors: &[DesignFactor::Order],
    },
    FixedTerm {
        name: "group:order",
        factors: &[DesignFactor::Group, DesignFactor::Order],
    },
];

/// Fixed-effect structure over the centered design covariates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FixedEffects {
    /// Gamified plus its two- and three-way interactions with group and
    /// order. Group and order carry no main effects.
    GamifiedCrossed,
    /// Group, order, and their interaction. Used when the sample observes
    /// a single gamified level and the full structure is unidentifiable.
    BetweenOnly,
}

impl FixedEffects {
    /// One term per design-matrix column, intercept first.
    #[must_use]
    pub fn terms(self) -> &'static [FixedTerm] {
        match self {
            Self::GamifiedCrossed => GAMIFIED_CROSSED_TERMS,
            Self::BetweenOnly => BETWEEN_ONLY_TERMS,
        }
    }

    /// Design factors referenced anywhere in this structure.
    #[must_use]
    pub fn factors(self) -> &'static [DesignFactor] {
        match self {
            Self::GamifiedCrossed => &[
                DesignFactor::Gamified,
                DesignFactor::Group,
                DesignFactor::Order,
            ],
            Self::BetweenOnly => &[DesignFactor::Group, DesignFactor::Order],
        }
    }

    /// Number of design-matrix columns.
    #[must_use]
    pub fn n_columns(self) -> usize {
        self.terms().len()
    }

    /// Evaluates one design-matrix row. `value_of` supplies the centered
    /// value of each factor referenced by the structure.
    #[must_use]
    pub fn design_row<F>(self, value_of: F) -> Vec<f64>
    where
        F: Fn(DesignFactor) -> f64,
    {
        self.terms()
            .iter()
            .map(|term| term.factors.iter().map(|&f| value_of(f)).product())
            .collect()
    }
}

/// Random-intercept structure of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RandomIntercepts {
    /// One random intercept per subject (subject-level outcomes).
    Subject,
    /// Crossed random intercepts for subject and item (trial-level
    /// outcomes, where item difficulty varies).
    SubjectAndItem,
    /// No random intercepts. Reached only through the between-only
    /// fallback when every subject contributes a single observation and a
    /// subject intercept would be confounded with the residual.
    None,
}

impl RandomIntercepts {
    #[must_use]
    pub fn includes_subject(self) -> bool {
        matches!(self, Self::Subject | Self::SubjectAndItem)
    }

    #[must_use]
    pub fn includes_item(self) -> bool {
        matches!(self, Self::SubjectAndItem)
    }
}

/// Complete description of one model: outcome name, response family, and
/// the fixed/random structure. Immutable once constructed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSpec {
    /// Outcome variable name (e.g., `posttest_accuracy`).
    pub outcome: String,
    pub family: ResponseFamily,
    pub fixed: FixedEffects,
    pub random: RandomIntercepts,
}
