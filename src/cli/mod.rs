pub mod check;
pub mod datasets;
pub mod init;
pub mod read;
pub mod status;

use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Cell, Table};

use sheetbook::batch::{BatchResult, SourceOutcome};
use sheetbook::fmt::percent;

#[derive(Parser)]
#[command(name = "sheetbook", about = "Validate and load personal finance spreadsheets.")]
pub struct Cli {
    /// Log row-level validation detail
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and create its dataset folders.
    Init {
        /// Path for spreadsheet data (default: ~/Documents/sheetbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// List datasets, or show the fields of one dataset.
    Datasets {
        /// Dataset key, e.g. transaction
        dataset: Option<String>,
    },
    /// Read and validate a batch of spreadsheets for one dataset.
    Read {
        /// Dataset key: transaction, category, sub_category, income, investment
        dataset: String,
        /// Files to read (default: every spreadsheet in the dataset's folder)
        files: Vec<String>,
        /// Worksheet name (default: the dataset's sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Number of parallel workers
        #[arg(long)]
        workers: Option<usize>,
        /// Write records and stats as JSON to this path
        #[arg(long)]
        output: Option<String>,
    },
    /// Validate one spreadsheet and list every rejected row.
    Check {
        /// Dataset key
        dataset: String,
        /// File to check
        file: String,
        /// Worksheet name
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Show settings and the files found for each dataset.
    Status,
}

pub(crate) fn stats_table(batch: &BatchResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Source", "Accepted", "Rejected", "Success", "Detail"]);
    for stat in &batch.stats {
        let row = match &stat.outcome {
            SourceOutcome::Completed {
                accepted,
                rejected,
                success_rate,
            } => vec![
                Cell::new(&stat.source),
                Cell::new(accepted),
                Cell::new(rejected),
                Cell::new(rate_label(*success_rate)),
                Cell::new(""),
            ],
            SourceOutcome::Failed { reason } => vec![
                Cell::new(&stat.source),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("failed".red().to_string()),
                Cell::new(reason),
            ],
        };
        table.add_row(row);
    }
    table
}

fn rate_label(rate: f64) -> String {
    let label = percent(rate);
    if rate >= 100.0 {
        label.green().to_string()
    } else if rate > 0.0 {
        label.yellow().to_string()
    } else {
        label.red().to_string()
    }
}
