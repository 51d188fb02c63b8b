mod cli;

use std::path::Path;

use clap::Parser;

use cli::{Cli, Commands};
use sheetbook::logging::init_logging;
use sheetbook::settings::load_settings;

fn main() {
    let cli = Cli::parse();

    let settings = load_settings();
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        settings.log_level.as_str()
    };
    if let Err(e) = init_logging(level, settings.log_file.as_deref().map(Path::new)) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Datasets { dataset } => cli::datasets::run(dataset.as_deref()),
        Commands::Read {
            dataset,
            files,
            sheet,
            workers,
            output,
        } => cli::read::run(&dataset, &files, sheet.as_deref(), workers, output.as_deref()),
        Commands::Check {
            dataset,
            file,
            sheet,
        } => cli::check::run(&dataset, &file, sheet.as_deref()),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
