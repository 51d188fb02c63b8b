#![cfg(feature = "workbook")]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use sheetbook::batch::{BatchReader, SourceOutcome};
use sheetbook::datasets::Dataset;
use sheetbook::diagnostics::{DiagnosticEvent, MemorySink, NullSink, Severity};
use sheetbook::error::SheetbookError;
use sheetbook::models::{Sentinel, Value};
use sheetbook::reader::{read_source, SheetSelector, SourceDescriptor};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn descriptor(dataset: Dataset, file: &str) -> SourceDescriptor {
    dataset
        .descriptors(&[fixture(file)], None)
        .unwrap()
        .remove(0)
}

#[test]
fn categories_sheet_with_blank_row() {
    let sink = MemorySink::new();
    let result = read_source(&descriptor(Dataset::Category, "expense.xlsx"), &sink).unwrap();

    assert_eq!(result.accepted, 2);
    assert_eq!(result.rejected, 1);
    assert_eq!(result.success_rate(), 66.67);
    let names: Vec<_> = result.records.iter().map(|r| r.get("name").cloned()).collect();
    assert_eq!(
        names,
        vec![
            Some(Value::Text("Clothing".into())),
            Some(Value::Text("Accessories".into())),
        ]
    );

    let rejected: Vec<usize> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            DiagnosticEvent::RowRejected { row, .. } => Some(*row),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![3]);
}

#[test]
fn transaction_sheet_types_and_sentinels() {
    let sink = MemorySink::new();
    let result = read_source(&descriptor(Dataset::Transaction, "expense.xlsx"), &sink).unwrap();

    assert_eq!(result.accepted, 3);
    assert_eq!(result.rejected, 1);
    assert_eq!(result.success_rate(), 75.0);
    let rejected = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, DiagnosticEvent::RowRejected { row: 4, .. }))
        .count();
    assert_eq!(rejected, 1);

    let first = &result.records[0];
    assert_eq!(first.len(), 15);
    assert_eq!(
        first.get("date"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()))
    );
    assert_eq!(first.get("brand"), Some(&Value::Sentinel(Sentinel::Na)));
    assert_eq!(first.get("quantity_or_duration"), Some(&Value::Integer(2)));
    assert_eq!(first.get("price"), Some(&Value::Float(1499.5)));
    assert_eq!(first.get("relation"), Some(&Value::Null));
    assert_eq!(first.get("details"), Some(&Value::Sentinel(Sentinel::Missing)));
    assert!(first.get("scratch").is_none());

    let second = &result.records[1];
    assert_eq!(
        second.get("quantity_or_duration"),
        Some(&Value::Sentinel(Sentinel::Na))
    );
    assert_eq!(second.get("transaction_mode"), Some(&Value::Null));

    // Row 4 is the rejected one; row 5 keeps its place after it.
    assert_eq!(
        result.records[2].get("product_or_service_name"),
        Some(&Value::Text("Sneakers".into()))
    );
}

#[test]
fn named_sheet_is_used_verbatim() {
    let d = Dataset::SubCategory
        .descriptors(&[fixture("expense.xlsx")], Some("Sub Category"))
        .unwrap()
        .remove(0);
    let result = read_source(&d, &NullSink).unwrap();
    assert_eq!(result.accepted, 2);
    assert_eq!(
        result.records[1].get("category_name"),
        Some(&Value::Text("Accessories".into()))
    );
}

#[test]
fn missing_named_sheet_is_unreadable() {
    let d = descriptor(Dataset::Category, "expense.xlsx")
        .with_sheet(SheetSelector::Named("Budget".into()));
    let err = read_source(&d, &NullSink).unwrap_err();
    match err {
        SheetbookError::SourceUnreadable { file, reason } => {
            assert_eq!(file, "expense.xlsx");
            assert!(reason.contains("Budget"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn workbook_without_dataset_sheet_is_unreadable() {
    let err = read_source(&descriptor(Dataset::Category, "sheet1_categories.xlsx"), &NullSink).unwrap_err();
    assert!(matches!(err, SheetbookError::SourceUnreadable { .. }));
}

#[test]
fn sub_category_sheet_is_not_read_as_categories() {
    let err = read_source(&descriptor(Dataset::Category, "sub_categories.xlsx"), &NullSink).unwrap_err();
    match err {
        SheetbookError::SourceUnreadable { file, reason } => {
            assert_eq!(file, "sub_categories.xlsx");
            assert!(reason.contains("Category"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let result = read_source(&descriptor(Dataset::SubCategory, "sub_categories.xlsx"), &NullSink).unwrap();
    assert_eq!(result.accepted, 2);
}

#[test]
fn first_selector_reads_single_sheet_workbook() {
    let d = descriptor(Dataset::Category, "sheet1_categories.xlsx").with_sheet(SheetSelector::First);
    let result = read_source(&d, &NullSink).unwrap();
    assert_eq!(result.accepted, 2);
    assert_eq!(result.rejected, 0);
}

#[test]
fn first_selector_reads_leading_sheet() {
    let d = descriptor(Dataset::Transaction, "expense.xlsx").with_sheet(SheetSelector::First);
    let result = read_source(&d, &NullSink).unwrap();
    assert_eq!(result.total(), 4);
}

#[test]
fn blank_header_cell_fails_extraction() {
    let err = read_source(&descriptor(Dataset::SubCategory, "blank_header.xlsx"), &NullSink).unwrap_err();
    assert!(matches!(err, SheetbookError::SchemaExtractionFailed { .. }));
}

#[test]
fn sheet_without_rows_is_empty() {
    let err = read_source(&descriptor(Dataset::Category, "empty.xlsx"), &NullSink).unwrap_err();
    assert!(matches!(err, SheetbookError::SourceEmpty(_)));
}

#[test]
fn batch_over_workbooks_isolates_failures() {
    let locations = vec![
        fixture("expense.xlsx"),
        fixture("does_not_exist.xlsx"),
        fixture("categories.xlsx"),
        fixture("sub_categories.xlsx"),
    ];
    let sources = Dataset::Category.descriptors(&locations, None).unwrap();
    let sink = Arc::new(MemorySink::new());
    let batch = BatchReader::new(sink.clone())
        .with_workers(2)
        .read_batch(&sources)
        .unwrap();

    assert_eq!(batch.records.len(), 4);
    assert_eq!(batch.stats.len(), 4);
    assert_eq!(batch.failed_count(), 2);
    let rate = |name: &str| batch.stat(name).unwrap().outcome.success_rate();
    assert_eq!(rate("expense.xlsx"), 66.67);
    assert_eq!(rate("categories.xlsx"), 100.0);
    for missing in ["does_not_exist.xlsx", "sub_categories.xlsx"] {
        assert!(matches!(
            batch.stat(missing).unwrap().outcome,
            SourceOutcome::Failed { .. }
        ));
    }
    assert_eq!(sink.count(Severity::Error), 2);
}

#[test]
fn single_worker_keeps_submission_order() {
    let locations = vec![fixture("expense.xlsx"), fixture("categories.xlsx")];
    let sources = Dataset::Category.descriptors(&locations, None).unwrap();
    let batch = BatchReader::new(Arc::new(NullSink))
        .with_workers(1)
        .read_batch(&sources)
        .unwrap();

    let names: Vec<_> = batch
        .records
        .iter()
        .filter_map(|r| match r.get("name") {
            Some(Value::Text(s)) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["Clothing", "Accessories", "Food", "Travel"]);
}
