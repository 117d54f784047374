//! Mixed-effects modeling core for the gamefx analysis pipeline.
//!
//! This crate implements the inferential half of the pipeline: encoding the
//! quasi-experimental design into well-posed numeric covariates, fitting one
//! mixed-effects model per outcome variable, and answering counterfactual
//! "what would the average response be under condition X" queries against a
//! fitted model.
//!
//! # Overview
//!
//! The modeling workflow for one outcome variable:
//!
//! 1. **Encode the design** ([`design::CenteredCovariate`]): each binary
//!    design factor (gamified, group, order) is mapped to {0, 1} and centered
//!    on the mean of the fitting sample, so interaction terms are orthogonal
//!    to the grand mean and the intercept stays interpretable.
//! 2. **Describe the model** ([`formula::FixedEffects`],
//!    [`formula::RandomIntercepts`], [`family::ResponseFamily`]): the fixed
//!    and random structures are closed enums, not string templates, so an
//!    ill-formed model cannot be expressed.
//! 3. **Fit** ([`fit::fit`]): Gaussian outcomes are fit by REML, binary
//!    outcomes by penalized quasi-likelihood around the same REML core.
//!    Non-fatal convergence and singularity caveats are attached to the
//!    returned [`fit::FittedModel`], never swallowed.
//! 4. **Query** ([`predict::marginal_predictions`]): population-level
//!    predictions (random effects at zero) over a Cartesian grid of held and
//!    swept covariate values, inverse-linked back to the response scale.
//!
//! The centering origins travel with the fitted model: every prediction
//! query uses exactly the covariate encoding of the fitting sample.
//!
//! # Modules
//!
//! - [`design`]: Design factors and centered covariates
//! - [`family`]: Response families (identity, log-linear, binomial-logit)
//! - [`formula`]: Fixed-effect and random-intercept structures
//! - [`fit`]: The REML/PQL mixed-model fitting engine
//! - [`predict`]: The counterfactual prediction engine

pub mod design;
pub mod family;
pub mod fit;
pub mod formula;
pub mod predict;
