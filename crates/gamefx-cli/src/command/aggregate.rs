//! Descriptive aggregation command
//!
//! Prints grouped mean/SE/count tables over the trial records. These are
//! the tables the plotting collaborator consumes, and the quickest sanity
//! check that a dataset loaded as intended.

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use gamefx_analysis::{
    aggregate::{AggregateTable, SubjectStatistic},
    trial::TrialRecord,
};

use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyArg {
    Block,
    Condition,
    Gamified,
    Group,
    Order,
    Item,
    Question,
}

impl KeyArg {
    fn label(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Condition => "condition",
            Self::Gamified => "gamified",
            Self::Group => "group",
            Self::Order => "order",
            Self::Item => "item",
            Self::Question => "question",
        }
    }

    fn extract(self, record: &TrialRecord) -> String {
        match self {
            Self::Block => record.block.to_string(),
            Self::Condition => record.condition.clone(),
            Self::Gamified => record.gamified.to_string(),
            Self::Group => record.group.clone(),
            Self::Order => record.order.clone(),
            Self::Item => record.item_id.clone().unwrap_or_else(|| "-".to_string()),
            Self::Question => record.question.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ValueArg {
    /// Correctness as a 0/1 indicator
    Correct,
    /// Response time in milliseconds
    ResponseTime,
    /// Rating or score value
    Rating,
}

impl ValueArg {
    fn extract(self, record: &TrialRecord) -> Option<f64> {
        match self {
            Self::Correct => record.correct.map(|c| if c { 1.0 } else { 0.0 }),
            Self::ResponseTime => record.response_time_ms,
            Self::Rating => record.rating,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub(crate) struct AggregateArg {
    /// Path to the trials JSON file
    pub data: PathBuf,

    /// Grouping key columns (comma-separated)
    #[arg(long, value_delimiter = ',', default_values = ["block", "condition", "gamified"])]
    pub keys: Vec<KeyArg>,

    /// Which measurement to summarize
    #[arg(long, value_enum)]
    pub value: ValueArg,

    /// Collapse to one median per subject per cell first, then summarize
    /// across subjects
    #[arg(long)]
    pub within_subject: bool,
}

pub(crate) fn run(arg: &AggregateArg) -> anyhow::Result<()> {
    let collection = util::read_trials_file(&arg.data)?;
    let trials = &collection.trials;

    let key = |record: &TrialRecord| -> Vec<String> {
        arg.keys.iter().map(|k| k.extract(record)).collect()
    };
    let value = |record: &TrialRecord| arg.value.extract(record);

    let table = if arg.within_subject {
        AggregateTable::collect_within_subject(
            trials,
            key,
            |record| record.subject_id.clone(),
            value,
            SubjectStatistic::Median,
        )
    } else {
        AggregateTable::collect_by_group(trials, key, value)
    };

    let header = arg
        .keys
        .iter()
        .map(|k| format!("{:<16}", k.label()))
        .collect::<String>();
    println!("{header} {:>10} {:>10} {:>8}", "mean", "se", "n");
    println!("{}", "-".repeat(16 * arg.keys.len() + 31));
    for (key, cell) in &table.cells {
        let cells = key
            .iter()
            .map(|part| format!("{part:<16}"))
            .collect::<String>();
        println!(
            "{cells} {:>10.4} {:>10.4} {:>8}",
            cell.mean, cell.std_err, cell.count
        );
    }

    let undefined = table.undefined_cells().count();
    if undefined > 0 {
        println!("\nNote: standard error undefined (n < 2) for {undefined} cell(s).");
    }

    Ok(())
}
