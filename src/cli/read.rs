use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use sheetbook::batch::{BatchReader, SourceStat};
use sheetbook::datasets::get_by_key;
use sheetbook::diagnostics::TracingSink;
use sheetbook::fmt::count;
use sheetbook::models::ValidatedRecord;
use sheetbook::settings::{load_settings, shellexpand_path};

use super::stats_table;

#[derive(Serialize)]
struct Output<'a> {
    dataset: &'a str,
    records: &'a [ValidatedRecord],
    stats: &'a [SourceStat],
}

pub fn run(
    dataset: &str,
    files: &[String],
    sheet: Option<&str>,
    workers: Option<usize>,
    output: Option<&str>,
) -> Result<()> {
    let dataset = get_by_key(dataset)?;
    let settings = load_settings();

    let locations: Vec<PathBuf> = if files.is_empty() {
        let data_dir = PathBuf::from(&settings.data_dir);
        let found = dataset.resolve_sources(&data_dir)?;
        if found.is_empty() {
            println!(
                "No spreadsheets found in {}",
                data_dir.join(dataset.group()).display()
            );
            return Ok(());
        }
        found
    } else {
        files.iter().map(|f| PathBuf::from(shellexpand_path(f))).collect()
    };

    let sources = dataset.descriptors(&locations, sheet)?;
    let mut reader = BatchReader::new(Arc::new(TracingSink));
    if let Some(n) = workers.or(settings.workers) {
        reader = reader.with_workers(n);
    }
    info!(
        dataset = dataset.key(),
        sources = sources.len(),
        workers = reader.workers(),
        "Reading batch"
    );

    let batch = reader.read_batch(&sources)?;

    println!("{}\n{}", dataset.name(), stats_table(&batch));
    println!(
        "{} loaded from {}, {} failed",
        count(batch.records.len(), "record"),
        count(batch.stats.len(), "source"),
        batch.failed_count()
    );

    if let Some(path) = output {
        let path = Path::new(path);
        let json = serde_json::to_string_pretty(&Output {
            dataset: dataset.key(),
            records: &batch.records,
            stats: &batch.stats,
        })?;
        std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
