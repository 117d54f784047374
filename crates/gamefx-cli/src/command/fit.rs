//! Model-fitting command
//!
//! Runs every outcome of one analysis pass through the mixed-model
//! pipeline and prints the coefficient and counterfactual prediction
//! tables that feed the downstream report.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use serde::Serialize;

use gamefx_analysis::{
    batch::{self, OutcomeResult},
    outcome::AnalysisPass,
};
use gamefx_model::{
    fit::{Coefficient, FitConfig, FittedModel},
    predict::PredictionTable,
};

use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PassArg {
    Practice,
    Posttest,
    Survey,
}

impl From<PassArg> for AnalysisPass {
    fn from(value: PassArg) -> Self {
        match value {
            PassArg::Practice => AnalysisPass::Practice,
            PassArg::Posttest => AnalysisPass::PostTest,
            PassArg::Survey => AnalysisPass::Survey,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub(crate) struct FitArg {
    /// Path to the trials JSON file
    pub data: PathBuf,

    /// Which analysis pass to run
    #[arg(long, value_enum)]
    pub pass: PassArg,

    /// Also save the result tables as JSON to this path
    #[arg(long)]
    pub json_output: Option<PathBuf>,
}

pub(crate) fn run(arg: &FitArg) -> anyhow::Result<()> {
    let collection = util::read_trials_file(&arg.data)?;
    let pass = AnalysisPass::from(arg.pass);
    let results = batch::run_pass(pass, &collection, &FitConfig::default());

    println!(
        "Mixed-model report: {} pass ({} outcomes, {} subjects)",
        pass.name(),
        results.len(),
        collection.subjects().len(),
    );

    for outcome in &results {
        print_outcome(outcome);
    }

    let failed = results.iter().filter(|r| r.result.is_err()).count();
    if failed > 0 {
        println!("\n{failed} outcome(s) failed; see causes above.");
    }

    if let Some(path) = &arg.json_output {
        let export: Vec<OutcomeExport> = results.iter().map(OutcomeExport::from).collect();
        util::write_json_file(&export, path)?;
        println!("\nResult tables saved to: {}", path.display());
    }

    Ok(())
}

/// JSON export shape for one outcome's tables.
#[derive(Debug, Serialize)]
struct OutcomeExport<'a> {
    outcome: &'a str,
    error: Option<String>,
    caveats: Vec<String>,
    coefficients: Option<&'a [Coefficient]>,
    predictions: Option<&'a [PredictionTable]>,
}

impl<'a> From<&'a OutcomeResult> for OutcomeExport<'a> {
    fn from(outcome: &'a OutcomeResult) -> Self {
        match &outcome.result {
            Ok(analysis) => Self {
                outcome: outcome.name,
                error: None,
                caveats: analysis
                    .model
                    .warnings()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                coefficients: Some(analysis.model.coefficients()),
                predictions: Some(&analysis.predictions),
            },
            Err(err) => Self {
                outcome: outcome.name,
                error: Some(err.to_string()),
                caveats: vec![],
                coefficients: None,
                predictions: None,
            },
        }
    }
}

fn print_outcome(outcome: &OutcomeResult) {
    println!("\n========================================");
    println!("Outcome: {}", outcome.name);
    println!("========================================");

    match &outcome.result {
        Ok(analysis) => {
            print_model(&analysis.model);
            for table in &analysis.predictions {
                print_predictions(table);
            }
        }
        Err(err) => println!("  FAILED: {err}"),
    }
}

fn print_model(model: &FittedModel) {
    let spec = model.spec();
    println!(
        "  family: {}, n = {} observations, {} subjects{}",
        spec.family.name(),
        model.n_obs(),
        model.n_subjects(),
        if model.n_items() > 0 {
            format!(", {} items", model.n_items())
        } else {
            String::new()
        },
    );
    for warning in model.warnings() {
        println!("  CAVEAT: {warning}");
    }

    println!("\n  Fixed effects:");
    println!(
        "  {:<24} {:>10} {:>10} {:>10} {:>8}",
        "Term", "Estimate", "Std.Err", "z", "p"
    );
    println!("  {}", "-".repeat(66));
    for c in model.coefficients() {
        println!(
            "  {:<24} {:>10.4} {:>10.4} {:>10.3} {:>8}",
            c.term,
            c.estimate,
            c.std_error,
            c.statistic,
            format_p(c.p_value),
        );
    }

    let variance = model.variance();
    let intercepts = variance
        .intercepts
        .iter()
        .map(|v| format!("{} {:.4}", v.grouping, v.variance))
        .collect::<Vec<_>>()
        .join(", ");
    if intercepts.is_empty() {
        println!("\n  Residual variance: {:.4}", variance.residual);
    } else {
        println!(
            "\n  Random-intercept variance: {intercepts}; residual {:.4}",
            variance.residual
        );
    }
}

fn print_predictions(table: &PredictionTable) {
    if table.swept.is_empty() {
        println!("\n  Marginal prediction (all covariates held):");
    } else {
        println!("\n  Marginal predictions (sweeping {}):", table.swept.join(", "));
    }

    let Some(first) = table.rows.first() else {
        return;
    };
    let factor_labels: Vec<&str> = first.values.keys().copied().collect();
    let header = factor_labels
        .iter()
        .map(|label| format!("{label:>10}"))
        .collect::<String>();
    println!("  {header} {:>12}", "predicted");
    for row in &table.rows {
        let cells = factor_labels
            .iter()
            .map(|label| format!("{:>10.3}", row.values[label]))
            .collect::<String>();
        println!("  {cells} {:>12.4}", row.predicted);
    }
}

fn format_p(p: f64) -> String {
    if p.is_nan() {
        "NaN".to_string()
    } else if p < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{p:.3}")
    }
}
