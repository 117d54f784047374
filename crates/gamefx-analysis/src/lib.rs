//! Experiment-level analysis for the gamified-feedback learning study.
//!
//! This crate connects the raw trial dataset to the modeling core: it owns
//! the trial-record data model, the descriptive aggregation tables, the
//! catalog of outcome variables, and the batch runner that fits one mixed
//! model per outcome and runs the standard counterfactual queries.
//!
//! # Overview
//!
//! An analysis pass (practice, post-test, or survey) proceeds as:
//!
//! 1. **Load trials** ([`trial::TrialCollection`]): the immutable
//!    trial-level dataset, deserialized by the caller
//! 2. **Describe** ([`aggregate::AggregateTable`]): grouped mean/SE/count
//!    tables for plotting and sanity checks, including the two-stage
//!    per-subject nested form for response times
//! 3. **Fit** ([`batch::run_pass`]): every outcome of the pass runs its
//!    own encode → fit → predict pipeline, in parallel, with per-outcome
//!    failure isolation
//!
//! Each outcome variable is one [`outcome::OutcomeSpec`] configuration
//! value; no outcome has its own code path.
//!
//! # Modules
//!
//! - [`trial`]: Trial records and the dataset collection
//! - [`aggregate`]: Grouped and nested descriptive aggregation
//! - [`outcome`]: The outcome-variable catalog per analysis pass
//! - [`batch`]: The parallel per-outcome pipeline runner

pub mod aggregate;
pub mod batch;
pub mod outcome;
pub mod trial;
