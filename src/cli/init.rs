use std::path::PathBuf;

use anyhow::Result;

use sheetbook::datasets::ALL_DATASETS;
use sheetbook::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    for dataset in ALL_DATASETS {
        std::fs::create_dir_all(resolved.join(dataset.group()))?;
    }

    println!("Initialized sheetbook at {}", resolved.display());
    Ok(())
}
