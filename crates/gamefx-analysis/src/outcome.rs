//! The outcome-variable catalog.
//!
//! The analysis fits the same model shape to roughly ten outcome
//! variables across three passes. Each outcome is one [`OutcomeSpec`]
//! configuration value — response field, response family, and analysis
//! level — consumed by the generic pipeline in [`crate::batch`]. Adding an
//! outcome means adding a catalog entry, not a code path.

use gamefx_model::{
    family::ResponseFamily,
    formula::RandomIntercepts,
};

use crate::trial::TrialRecord;

/// The three analysis passes of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPass {
    Practice,
    PostTest,
    Survey,
}

impl AnalysisPass {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::PostTest => "post-test",
            Self::Survey => "survey",
        }
    }

    /// The outcome variables analyzed in this pass.
    #[must_use]
    pub fn outcomes(self) -> &'static [OutcomeSpec] {
        match self {
            Self::Practice => PRACTICE_OUTCOMES,
            Self::PostTest => POSTTEST_OUTCOMES,
            Self::Survey => SURVEY_OUTCOMES,
        }
    }
}

/// Whether an outcome varies per trial or only per subject (per block).
/// Trial-level outcomes carry a crossed item random intercept; subject-
/// level outcomes only the subject intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLevel {
    Trial,
    Subject,
}

impl OutcomeLevel {
    /// The random-intercept structure this level requests. The batch
    /// runner may still drop the subject intercept for the between-only
    /// fallback when every subject contributes a single row.
    #[must_use]
    pub fn random_intercepts(self) -> RandomIntercepts {
        match self {
            Self::Trial => RandomIntercepts::SubjectAndItem,
            Self::Subject => RandomIntercepts::Subject,
        }
    }
}

/// Which column of the trial record an outcome reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseField {
    /// Correctness flag; missing for non-response items.
    Correctness,
    /// Response time in milliseconds; non-positive and missing values are
    /// excluded (the log-linear family needs a strictly positive response).
    ResponseTime,
    /// Practice/aggregate score carried in the rating column of rows
    /// without a question label.
    Score,
    /// A survey rating, matched by question label.
    Rating { question: &'static str },
}

impl ResponseField {
    /// Extracts the response value from a record, `None` when the record
    /// does not belong to this outcome's sample.
    #[must_use]
    pub fn extract(self, record: &TrialRecord) -> Option<f64> {
        match self {
            Self::Correctness => record.correct.map(|c| if c { 1.0 } else { 0.0 }),
            Self::ResponseTime => record.response_time_ms.filter(|&rt| rt > 0.0),
            Self::Score => {
                if record.question.is_none() {
                    record.rating
                } else {
                    None
                }
            }
            Self::Rating { question } => {
                if record.question.as_deref() == Some(question) {
                    record.rating
                } else {
                    None
                }
            }
        }
    }
}

/// One outcome variable: a configuration value for the generic pipeline.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeSpec {
    /// Outcome name used in reports (e.g., `posttest_accuracy`).
    pub name: &'static str,
    pub family: ResponseFamily,
    pub level: OutcomeLevel,
    pub response: ResponseField,
}

const PRACTICE_OUTCOMES: &[OutcomeSpec] = &[
    OutcomeSpec {
        name: "practice_accuracy",
        family: ResponseFamily::BinomialLogit,
        level: OutcomeLevel::Trial,
        response: ResponseField::Correctness,
    },
    OutcomeSpec {
        name: "practice_rt",
        family: ResponseFamily::LinearLog,
        level: OutcomeLevel::Trial,
        response: ResponseField::ResponseTime,
    },
    OutcomeSpec {
        name: "practice_score",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Score,
    },
];

const POSTTEST_OUTCOMES: &[OutcomeSpec] = &[
    OutcomeSpec {
        name: "posttest_accuracy",
        family: ResponseFamily::BinomialLogit,
        level: OutcomeLevel::Trial,
        response: ResponseField::Correctness,
    },
    OutcomeSpec {
        name: "posttest_rt",
        family: ResponseFamily::LinearLog,
        level: OutcomeLevel::Trial,
        response: ResponseField::ResponseTime,
    },
];

const SURVEY_OUTCOMES: &[OutcomeSpec] = &[
    OutcomeSpec {
        name: "enjoyment",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Rating { question: "enjoyment" },
    },
    OutcomeSpec {
        name: "motivation",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Rating { question: "motivation" },
    },
    OutcomeSpec {
        name: "effort",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Rating { question: "effort" },
    },
    OutcomeSpec {
        name: "judgment_of_learning",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Rating {
            question: "judgment_of_learning",
        },
    },
    // Asked only in the gamified condition; the pipeline reduces the
    // fixed structure to group/order for this outcome.
    OutcomeSpec {
        name: "perceived_relevance",
        family: ResponseFamily::LinearIdentity,
        level: OutcomeLevel::Subject,
        response: ResponseField::Rating {
            question: "perceived_relevance",
        },
    },
];
