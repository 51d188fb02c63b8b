use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use sheetbook::datasets::get_by_key;
use sheetbook::diagnostics::{DiagnosticEvent, MemorySink};
use sheetbook::fmt::{count, percent};
use sheetbook::reader::read_source;
use sheetbook::settings::shellexpand_path;

pub fn run(dataset: &str, file: &str, sheet: Option<&str>) -> Result<()> {
    let dataset = get_by_key(dataset)?;
    let location = PathBuf::from(shellexpand_path(file));
    let descriptors = dataset.descriptors(&[location], sheet)?;
    let Some(descriptor) = descriptors.first() else {
        return Ok(());
    };

    let sink = MemorySink::new();
    let result = match read_source(descriptor, &sink) {
        Ok(result) => result,
        Err(e) if e.is_source_level() => {
            return Err(e).context(format!("no rows checked in {}", descriptor.identifier()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut table = Table::new();
    table.set_header(vec!["Row", "Problem"]);
    for event in sink.events() {
        if let DiagnosticEvent::RowRejected { row, detail, .. } = event {
            table.add_row(vec![Cell::new(row), Cell::new(detail)]);
        }
    }

    if result.rejected > 0 {
        println!("Rejected rows in {}\n{table}", descriptor.identifier());
    }
    println!(
        "{}: {} accepted, {} rejected ({})",
        descriptor.identifier(),
        count(result.accepted, "row"),
        count(result.rejected, "row"),
        percent(result.success_rate())
    );
    Ok(())
}
