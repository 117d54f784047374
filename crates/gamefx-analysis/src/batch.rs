//! Per-outcome analysis pipelines and the parallel pass runner.
//!
//! Every outcome variable runs the same pipeline: select its sample from
//! the trial records, encode the design factors into centered covariates,
//! fit the mixed model, and evaluate the standard counterfactual queries.
//! Outcomes share no mutable state, so a pass runs them concurrently under
//! scoped threads and joins the results into one report.
//!
//! # Failure isolation
//!
//! A fatal error (malformed factor levels, insufficient data) aborts only
//! the outcome that raised it; every other outcome of the pass still
//! completes. Non-fatal fit caveats stay attached to the fitted model and
//! travel with the successful result. Nothing is retried: a non-converged
//! fit is reported as such, which keeps results reproducible and
//! auditable.
//!
//! # Structure reduction
//!
//! Two reductions are applied from the observed sample, never from the
//! outcome catalog:
//!
//! - A single observed gamified level (e.g., a question asked only in the
//!   gamified condition) reduces the fixed structure to
//!   `group + order + group:order`; fitting the full structure there would
//!   produce an unidentifiable model.
//! - Under that reduced structure, when every subject contributes exactly
//!   one row, the subject intercept is dropped as well: a grouping with
//!   one observation per group is confounded with the residual.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use gamefx_model::{
    design::{CenteredCovariate, DesignEncodingError, DesignFactor},
    fit::{self, CovariateColumn, FitConfig, FittedModel, InsufficientDataError, ModelSample},
    formula::{FixedEffects, ModelSpec, RandomIntercepts},
    predict::{GridAxis, PredictionError, PredictionTable, marginal_predictions},
};

use crate::{
    outcome::{AnalysisPass, OutcomeLevel, OutcomeSpec},
    trial::{TrialCollection, TrialRecord},
};

/// A fatal, per-outcome pipeline failure.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum AnalysisError {
    #[display("{_0}")]
    Design(DesignEncodingError),
    #[display("{_0}")]
    Data(InsufficientDataError),
    #[display("{_0}")]
    Prediction(PredictionError),
}

/// The complete result for one successfully analyzed outcome.
#[derive(Debug)]
pub struct OutcomeAnalysis {
    pub name: &'static str,
    pub model: FittedModel,
    /// Standard counterfactual query tables, gamified sweep first.
    pub predictions: Vec<PredictionTable>,
}

/// Result slot for one outcome of a pass: either the analysis or the
/// fatal error that aborted it.
#[derive(Debug)]
pub struct OutcomeResult {
    pub name: &'static str,
    pub result: Result<OutcomeAnalysis, AnalysisError>,
}

/// Runs every outcome of an analysis pass, one scoped thread per outcome.
/// Results are returned in catalog order regardless of completion order.
#[must_use]
pub fn run_pass(
    pass: AnalysisPass,
    collection: &TrialCollection,
    config: &FitConfig,
) -> Vec<OutcomeResult> {
    thread::scope(|scope| {
        let handles: Vec<_> = pass
            .outcomes()
            .iter()
            .map(|spec| {
                scope.spawn(move || OutcomeResult {
                    name: spec.name,
                    result: analyze_outcome(spec, &collection.trials, config),
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("outcome analysis thread panicked"))
            .collect()
    })
}

/// Runs the full pipeline for one outcome: sample selection, design
/// encoding (with structure reduction), model fit, and the standard
/// counterfactual queries.
pub fn analyze_outcome(
    spec: &OutcomeSpec,
    trials: &[TrialRecord],
    config: &FitConfig,
) -> Result<OutcomeAnalysis, AnalysisError> {
    let rows: Vec<(&TrialRecord, f64)> = trials
        .iter()
        .filter(|t| spec.level != OutcomeLevel::Trial || t.item_id.is_some())
        .filter_map(|t| spec.response.extract(t).map(|response| (t, response)))
        .collect();
    if rows.is_empty() {
        return Err(InsufficientDataError::EmptySample {
            outcome: spec.name.to_string(),
        }
        .into());
    }

    let subject_ids: BTreeSet<&str> = rows.iter().map(|(t, _)| t.subject_id.as_str()).collect();
    let subject_index: BTreeMap<&str, usize> = subject_ids
        .into_iter()
        .enumerate()
        .map(|(i, s)| (s, i))
        .collect();
    let n_subjects = subject_index.len();
    if n_subjects < 2 {
        return Err(InsufficientDataError::TooFewSubjects { found: n_subjects }.into());
    }

    // A question asked under a single gamified level cannot support the
    // gamified terms; reduce to the between-subject structure.
    let gamified_levels: BTreeSet<bool> = rows.iter().map(|(t, _)| t.gamified).collect();
    let fixed = if gamified_levels.len() < 2 {
        FixedEffects::BetweenOnly
    } else {
        FixedEffects::GamifiedCrossed
    };

    let mut rows_per_subject = vec![0_usize; n_subjects];
    for (t, _) in &rows {
        rows_per_subject[subject_index[t.subject_id.as_str()]] += 1;
    }
    let random = if fixed == FixedEffects::BetweenOnly
        && rows_per_subject.iter().all(|&count| count <= 1)
    {
        RandomIntercepts::None
    } else {
        spec.level.random_intercepts()
    };

    let mut covariates = BTreeMap::new();
    for &factor in fixed.factors() {
        let levels: Vec<&str> = rows
            .iter()
            .map(|(t, _)| match factor {
                DesignFactor::Gamified => {
                    if t.gamified {
                        "gamified"
                    } else {
                        "control"
                    }
                }
                DesignFactor::Group => t.group.as_str(),
                DesignFactor::Order => t.order.as_str(),
            })
            .collect();
        let (covariate, values) = CenteredCovariate::encode(factor, &levels)?;
        covariates.insert(factor, CovariateColumn { covariate, values });
    }

    let (item, n_items) = if spec.level == OutcomeLevel::Trial {
        let item_ids: BTreeSet<&str> = rows
            .iter()
            .filter_map(|(t, _)| t.item_id.as_deref())
            .collect();
        let item_index: BTreeMap<&str, usize> = item_ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        let column: Vec<usize> = rows
            .iter()
            .map(|(t, _)| {
                let id = t.item_id.as_deref().expect("trial-level rows carry an item id");
                item_index[id]
            })
            .collect();
        (Some(column), item_index.len())
    } else {
        (None, 0)
    };

    let sample = ModelSample {
        response: rows.iter().map(|(_, response)| *response).collect(),
        subject: rows
            .iter()
            .map(|(t, _)| subject_index[t.subject_id.as_str()])
            .collect(),
        n_subjects,
        item,
        n_items,
        covariates,
    };

    let model_spec = ModelSpec {
        outcome: spec.name.to_string(),
        family: spec.family,
        fixed,
        random,
    };
    let model = fit::fit(&model_spec, &sample, config)?;
    let predictions = standard_queries(&model)?;

    Ok(OutcomeAnalysis {
        name: spec.name,
        model,
        predictions,
    })
}

/// The standard counterfactual queries reported for every fitted model.
/// Each is a different held/swept partition of the same covariates; none
/// is a new modeling routine.
fn standard_queries(model: &FittedModel) -> Result<Vec<PredictionTable>, PredictionError> {
    match model.spec().fixed {
        FixedEffects::GamifiedCrossed => Ok(vec![
            // Gamified vs control for the average subject.
            marginal_predictions(
                model,
                &[
                    (DesignFactor::Gamified, GridAxis::Sweep),
                    (DesignFactor::Group, GridAxis::GrandMean),
                    (DesignFactor::Order, GridAxis::GrandMean),
                ],
            )?,
            // Does the gamified effect differ between groups?
            marginal_predictions(
                model,
                &[
                    (DesignFactor::Gamified, GridAxis::Sweep),
                    (DesignFactor::Group, GridAxis::Sweep),
                    (DesignFactor::Order, GridAxis::GrandMean),
                ],
            )?,
            // Does the gamified effect depend on presentation order?
            marginal_predictions(
                model,
                &[
                    (DesignFactor::Gamified, GridAxis::Sweep),
                    (DesignFactor::Group, GridAxis::GrandMean),
                    (DesignFactor::Order, GridAxis::Sweep),
                ],
            )?,
        ]),
        FixedEffects::BetweenOnly => Ok(vec![marginal_predictions(
            model,
            &[
                (DesignFactor::Group, GridAxis::Sweep),
                (DesignFactor::Order, GridAxis::Sweep),
            ],
        )?]),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_distr::{Bernoulli, Distribution, LogNormal, Normal};
    use rand_pcg::Pcg64Mcg;

    use super::*;

    /// Builds a full synthetic experiment export: practice trials with
    /// accuracy/response time, one practice score row per subject per
    /// block, and the survey ratings (perceived relevance only under the
    /// gamified condition).
    fn synthetic_collection(n_subjects: usize) -> TrialCollection {
        let mut rng = Pcg64Mcg::seed_from_u64(99);
        let accuracy = Bernoulli::new(0.8).unwrap();
        let rt = LogNormal::new(7.0, 0.4).unwrap();
        let rating_noise = Normal::new(0.0, 0.6).unwrap();
        let mut trials = Vec::new();

        for s in 0..n_subjects {
            let subject_id = format!("s{s:02}");
            let group = if s % 2 == 0 { "arithmetic" } else { "vocabulary" };
            let order = if (s / 2) % 2 == 0 { "control-first" } else { "gamified-first" };

            for (block, gamified) in [(1_u8, false), (2_u8, true)] {
                let condition = if gamified { "points+badges" } else { "plain" };
                let base = TrialRecord {
                    subject_id: subject_id.clone(),
                    block,
                    condition: condition.to_string(),
                    gamified,
                    group: group.to_string(),
                    order: order.to_string(),
                    item_id: None,
                    correct: None,
                    response_time_ms: None,
                    rating: None,
                    question: None,
                };

                for i in 0..3 {
                    let mut t = base.clone();
                    t.item_id = Some(format!("fact-{block}-{i}"));
                    t.correct = Some(accuracy.sample(&mut rng));
                    t.response_time_ms = Some(rt.sample(&mut rng));
                    trials.push(t);
                }

                let mut score = base.clone();
                score.rating = Some(60.0 + rating_noise.sample(&mut rng) * 10.0);
                trials.push(score);

                for question in ["enjoyment", "motivation", "effort", "judgment_of_learning"] {
                    let mut t = base.clone();
                    t.question = Some(question.to_string());
                    t.rating = Some(4.0 + rating_noise.sample(&mut rng));
                    trials.push(t);
                }
                if gamified {
                    let mut t = base.clone();
                    t.question = Some("perceived_relevance".to_string());
                    t.rating = Some(3.5 + rating_noise.sample(&mut rng));
                    trials.push(t);
                }
            }
        }

        TrialCollection { trials }
    }

    #[test]
    fn test_practice_pass_completes_every_outcome() {
        let collection = synthetic_collection(12);
        let results = run_pass(AnalysisPass::Practice, &collection, &FitConfig::default());

        assert_eq!(results.len(), 3);
        for outcome in &results {
            let analysis = outcome
                .result
                .as_ref()
                .unwrap_or_else(|_| panic!("outcome {} failed", outcome.name));
            assert!(!analysis.predictions.is_empty());
            // The gamified sweep is always the first standard query.
            assert_eq!(analysis.predictions[0].rows.len(), 2);
        }
    }

    #[test]
    fn test_accuracy_predictions_are_probabilities() {
        let collection = synthetic_collection(12);
        let analysis = analyze_outcome(
            &AnalysisPass::Practice.outcomes()[0],
            &collection.trials,
            &FitConfig::default(),
        )
        .unwrap();

        assert_eq!(analysis.name, "practice_accuracy");
        for table in &analysis.predictions {
            for row in &table.rows {
                assert!(row.predicted > 0.0 && row.predicted < 1.0);
                // The returned probability is exactly the logistic of the
                // reported linear predictor.
                let p = gamefx_model::family::logistic(row.linear_predictor);
                assert!((p - row.predicted).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_single_level_question_reduces_structure() {
        let collection = synthetic_collection(12);
        let results = run_pass(AnalysisPass::Survey, &collection, &FitConfig::default());

        let relevance = results
            .iter()
            .find(|r| r.name == "perceived_relevance")
            .unwrap();
        let analysis = relevance.result.as_ref().unwrap();
        assert_eq!(analysis.model.spec().fixed, FixedEffects::BetweenOnly);
        // One row per subject: the subject intercept is dropped too.
        assert_eq!(analysis.model.spec().random, RandomIntercepts::None);
        assert_eq!(analysis.model.coefficients().len(), 4);
        // Group x order sweep: a 2 x 2 grid.
        assert_eq!(analysis.predictions.len(), 1);
        assert_eq!(analysis.predictions[0].rows.len(), 4);

        // The two-level questions keep the full structure.
        let enjoyment = results.iter().find(|r| r.name == "enjoyment").unwrap();
        let analysis = enjoyment.result.as_ref().unwrap();
        assert_eq!(analysis.model.spec().fixed, FixedEffects::GamifiedCrossed);
        assert_eq!(analysis.model.spec().random, RandomIntercepts::Subject);
    }

    #[test]
    fn test_fatal_error_aborts_only_its_outcome() {
        let mut collection = synthetic_collection(10);
        // Strip every correctness flag: the accuracy model has no sample.
        for t in &mut collection.trials {
            t.correct = None;
        }
        let results = run_pass(AnalysisPass::Practice, &collection, &FitConfig::default());

        let accuracy = results.iter().find(|r| r.name == "practice_accuracy").unwrap();
        assert!(matches!(
            accuracy.result,
            Err(AnalysisError::Data(InsufficientDataError::EmptySample { .. }))
        ));
        let rt = results.iter().find(|r| r.name == "practice_rt").unwrap();
        assert!(rt.result.is_ok(), "practice_rt should be unaffected");
        let score = results.iter().find(|r| r.name == "practice_score").unwrap();
        assert!(score.result.is_ok(), "practice_score should be unaffected");
    }

    #[test]
    fn test_centering_origin_travels_with_the_model() {
        let collection = synthetic_collection(10);
        let analysis = analyze_outcome(
            &AnalysisPass::Practice.outcomes()[1],
            &collection.trials,
            &FitConfig::default(),
        )
        .unwrap();

        // Balanced within-subject design: the gamified origin is 0.5 and
        // the swept values in the first query reproduce it exactly.
        let covariate = analysis
            .model
            .covariate(DesignFactor::Gamified)
            .unwrap();
        assert!((covariate.origin() - 0.5).abs() < 1e-12);
        let swept: Vec<f64> = analysis.predictions[0]
            .rows
            .iter()
            .map(|row| row.values["gamified"])
            .collect();
        assert_eq!(swept, covariate.level_values().to_vec());
    }
}
