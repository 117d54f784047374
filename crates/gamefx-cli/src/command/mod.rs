use clap::{Parser, Subcommand};

use self::{aggregate::AggregateArg, fit::FitArg};

mod aggregate;
mod fit;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Fit the mixed models of one analysis pass and print coefficient and
    /// counterfactual prediction tables
    Fit(#[clap(flatten)] FitArg),
    /// Print grouped mean/SE/count tables for plotting and sanity checks
    Aggregate(#[clap(flatten)] AggregateArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Fit(arg) => fit::run(&arg)?,
        Mode::Aggregate(arg) => aggregate::run(&arg)?,
    }
    Ok(())
}
