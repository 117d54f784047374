//! Design factors and their centered numeric encoding.
//!
//! The experiment manipulates three binary factors: the within-subject
//! gamified/control condition and the between-subject group and
//! presentation-order counterbalancing arms. Models never see the raw
//! labels; each factor is encoded as a **centered covariate**: the two
//! observed levels are mapped to {0, 1} (lexicographically, so the
//! encoding is deterministic) and the sample mean of that indicator is
//! subtracted.
//!
//! Centering matters because the design is only partially crossed: with
//! centered covariates the interaction columns are orthogonal to the
//! intercept, and the intercept estimates the grand mean of the fitting
//! sample. The centering origin is computed once per fitting sample and
//! stored on the covariate; prediction queries reuse the stored origin
//! rather than recomputing it from whatever subsample is at hand.
//!
//! # Examples
//!
//! ```
//! use gamefx_model::design::{CenteredCovariate, DesignFactor};
//!
//! let levels = ["control", "gamified", "gamified", "control"];
//! let (covariate, column) = CenteredCovariate::encode(DesignFactor::Gamified, &levels).unwrap();
//!
//! // Balanced sample: origin 0.5, centered values ±0.5.
//! assert_eq!(covariate.origin(), 0.5);
//! assert_eq!(column, vec![-0.5, 0.5, 0.5, -0.5]);
//! assert!(column.iter().sum::<f64>().abs() < 1e-12);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The binary design factors of the experiment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum DesignFactor {
    /// Within-subject feedback condition (control vs gamified).
    Gamified,
    /// Between-subject experimental group arm.
    Group,
    /// Between-subject presentation order (which arm came first).
    Order,
}

impl DesignFactor {
    /// Column label used in output tables.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Gamified => "gamified",
            Self::Group => "group",
            Self::Order => "order",
        }
    }
}

/// Errors raised while encoding a design factor.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DesignEncodingError {
    /// The factor did not take exactly two distinct values in the sample.
    /// This signals a data-integrity problem upstream, not a modeling choice.
    #[display(
        "design factor '{factor}' must take exactly two levels in the sample, observed {observed}"
    )]
    LevelCount {
        factor: &'static str,
        observed: usize,
    },
}

/// A binary design factor encoded as a centered numeric covariate.
///
/// Holds everything needed to reproduce the encoding of the fitting
/// sample: the ordered level labels (index 0 encodes 0, index 1 encodes 1)
/// and the centering origin (the sample mean of the 0/1 indicator).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CenteredCovariate {
    factor: DesignFactor,
    /// The two observed levels, lexicographically ordered.
    levels: [String; 2],
    /// Mean of the 0/1 indicator over the fitting sample.
    origin: f64,
}

impl CenteredCovariate {
    /// Encodes one design factor over the full analysis sample of a model
    /// fit, returning the covariate description and the centered column.
    ///
    /// # Errors
    ///
    /// [`DesignEncodingError::LevelCount`] when the sample does not contain
    /// exactly two distinct levels.
    #[expect(clippy::cast_precision_loss)]
    pub fn encode<S>(
        factor: DesignFactor,
        raw_levels: &[S],
    ) -> Result<(Self, Vec<f64>), DesignEncodingError>
    where
        S: AsRef<str>,
    {
        let distinct: BTreeSet<&str> = raw_levels.iter().map(AsRef::as_ref).collect();
        if distinct.len() != 2 {
            return Err(DesignEncodingError::LevelCount {
                factor: factor.label(),
                observed: distinct.len(),
            });
        }

        let mut iter = distinct.into_iter();
        let low = iter.next().unwrap().to_string();
        let high = iter.next().unwrap().to_string();

        let indicators: Vec<f64> = raw_levels
            .iter()
            .map(|level| if level.as_ref() == high { 1.0 } else { 0.0 })
            .collect();
        let origin = indicators.iter().sum::<f64>() / raw_levels.len() as f64;
        let column = indicators.iter().map(|v| v - origin).collect();

        let covariate = Self {
            factor,
            levels: [low, high],
            origin,
        };
        Ok((covariate, column))
    }

    /// The factor this covariate encodes.
    #[must_use]
    pub fn factor(&self) -> DesignFactor {
        self.factor
    }

    /// The two observed level labels, low (encoded 0) first.
    #[must_use]
    pub fn levels(&self) -> [&str; 2] {
        [&self.levels[0], &self.levels[1]]
    }

    /// The centering origin: the fitting-sample mean of the 0/1 indicator.
    #[must_use]
    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Centered value of a raw level label, `None` for a label not observed
    /// at fit time.
    #[must_use]
    pub fn center(&self, level: &str) -> Option<f64> {
        if level == self.levels[0] {
            Some(-self.origin)
        } else if level == self.levels[1] {
            Some(1.0 - self.origin)
        } else {
            None
        }
    }

    /// The two centered values observed in the fitting sample, low level
    /// first. These are the values a prediction sweep enumerates.
    #[must_use]
    pub fn level_values(&self) -> [f64; 2] {
        [-self.origin, 1.0 - self.origin]
    }
}
