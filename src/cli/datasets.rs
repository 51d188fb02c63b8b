use anyhow::Result;
use comfy_table::{Cell, Table};

use sheetbook::datasets::{get_by_key, ALL_DATASETS};

pub fn run(dataset: Option<&str>) -> Result<()> {
    let Some(key) = dataset else {
        let mut table = Table::new();
        table.set_header(vec!["Key", "Name", "Folder", "Sheet", "Columns"]);
        for d in ALL_DATASETS {
            table.add_row(vec![
                Cell::new(d.key()),
                Cell::new(d.name()),
                Cell::new(d.group()),
                Cell::new(d.sheet()),
                Cell::new(d.column_bound()),
            ]);
        }
        println!("Datasets\n{table}");
        return Ok(());
    };

    let dataset = get_by_key(key)?;
    let schema = dataset.schema()?;
    if schema.is_passthrough() {
        println!(
            "{} ({}): no fields enforced, the first {} columns are loaded as-is.",
            dataset.name(),
            dataset.key(),
            dataset.column_bound()
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Field", "Accepts"]);
    for (i, field) in schema.fields().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&field.name),
            Cell::new(field.expectation()),
        ]);
    }
    println!("{} ({})\n{table}", dataset.name(), dataset.key());
    Ok(())
}
