//! Response families: distribution and link choices per outcome type.
//!
//! Each outcome variable is fit under one of three families, chosen by the
//! shape of its response:
//!
//! - [`ResponseFamily::LinearIdentity`] for continuous, roughly symmetric
//!   outcomes (survey ratings, aggregate scores)
//! - [`ResponseFamily::LinearLog`] for strictly positive, right-skewed
//!   outcomes (response times): the model is fit on the natural log and
//!   predictions are exponentiated back
//! - [`ResponseFamily::BinomialLogit`] for binary outcomes (correctness)
//!
//! The family owns both directions of the mapping: the transform applied
//! to the response before fitting and the inverse link applied to a linear
//! predictor when a prediction is reported on the original scale.

use serde::{Deserialize, Serialize};

/// The logistic function, inverse of the logit link.
#[must_use]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Response distribution and link for one outcome variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ResponseFamily {
    /// Gaussian errors, identity link.
    LinearIdentity,
    /// Gaussian errors on the natural log of the response, predictions
    /// exponentiated back to the original scale.
    LinearLog,
    /// Bernoulli response, logit link.
    BinomialLogit,
}

impl ResponseFamily {
    /// Short name used in report tables.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::LinearIdentity => "linear",
            Self::LinearLog => "log-linear",
            Self::BinomialLogit => "binomial-logit",
        }
    }

    /// Transform applied to the response before fitting.
    ///
    /// Binary responses pass through unchanged; the logit enters through
    /// the fitting algorithm, not a response transform.
    #[must_use]
    pub fn transform(self, response: f64) -> f64 {
        match self {
            Self::LinearIdentity | Self::BinomialLogit => response,
            Self::LinearLog => response.ln(),
        }
    }

    /// Inverse link mapping a linear predictor back to the response scale.
    #[must_use]
    pub fn inverse_link(self, eta: f64) -> f64 {
        match self {
            Self::LinearIdentity => eta,
            Self::LinearLog => eta.exp(),
            Self::BinomialLogit => logistic(eta),
        }
    }

    /// Whether this family is fit through the penalized quasi-likelihood
    /// path rather than a single REML pass.
    #[must_use]
    pub fn is_binomial(self) -> bool {
        matches!(self, Self::BinomialLogit)
    }
}
