use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use sheetbook::datasets::ALL_DATASETS;
use sheetbook::reader::SourceFormat;
use sheetbook::settings::{load_settings, settings_file_exists, settings_path};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = PathBuf::from(&settings.data_dir);

    let config = if settings_file_exists() {
        settings_path().display().to_string()
    } else {
        "(defaults, run `sheetbook init`)".to_string()
    };
    println!("Settings:   {config}");
    println!("Data dir:   {}", data_dir.display());
    println!(
        "Workers:    {}",
        settings
            .workers
            .map_or_else(|| "auto".to_string(), |n| n.to_string())
    );
    println!("Log file:   {}", settings.log_file.as_deref().unwrap_or("(none)"));

    if !data_dir.exists() {
        println!();
        println!("Data directory not found. Run `sheetbook init` to set up.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Dataset", "Folder", "Files", "Formats"]);
    for dataset in ALL_DATASETS {
        let files = dataset.resolve_sources(&data_dir)?;
        let mut formats: Vec<&str> = files
            .iter()
            .filter_map(|f| SourceFormat::detect(f))
            .map(|f| f.key())
            .collect();
        formats.sort_unstable();
        formats.dedup();
        table.add_row(vec![
            Cell::new(dataset.key()),
            Cell::new(dataset.group()),
            Cell::new(files.len()),
            Cell::new(formats.join(", ")),
        ]);
    }
    println!();
    println!("{table}");
    Ok(())
}
