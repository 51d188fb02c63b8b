use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::error::{Result, SheetbookError};
use crate::models::{Cell, RowRecord, ValidatedRecord};
use crate::schema::{normalize_header, RowValidator, Schema};

// ---------------------------------------------------------------------------
// Descriptors and results
// ---------------------------------------------------------------------------

/// Which worksheet of a workbook to read. Ignored for CSV.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelector {
    #[default]
    First,
    /// The named sheet must exist.
    Named(String),
}

#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub location: PathBuf,
    pub column_bound: usize,
    pub schema: Arc<Schema>,
    pub sheet: SheetSelector,
    name: Option<String>,
}

impl SourceDescriptor {
    pub fn new(location: impl Into<PathBuf>, column_bound: usize, schema: Arc<Schema>) -> Self {
        Self {
            location: location.into(),
            column_bound,
            schema,
            sheet: SheetSelector::First,
            name: None,
        }
    }

    pub fn with_sheet(mut self, sheet: SheetSelector) -> Self {
        self.sheet = sheet;
        self
    }

    /// Report this source under `name` instead of its file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in stats and diagnostics, the file name unless overridden.
    pub fn identifier(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.location
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.location.display().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceResult {
    pub records: Vec<ValidatedRecord>,
    pub accepted: usize,
    pub rejected: usize,
}

impl SourceResult {
    pub fn total(&self) -> usize {
        self.accepted + self.rejected
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.accepted, self.rejected)
    }
}

/// Percentage of accepted rows, rounded to two decimals. `0/0` is `0.0`.
pub fn success_rate(accepted: usize, rejected: usize) -> f64 {
    let total = accepted + rejected;
    if total == 0 {
        return 0.0;
    }
    let rate = accepted as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// One physical row of a source. `number` is 1-based, as a spreadsheet
/// application shows it.
#[derive(Debug, Clone, PartialEq)]
struct SheetRow {
    number: usize,
    cells: Vec<Cell>,
}

// ---------------------------------------------------------------------------
// Source formats, dispatched on file extension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceFormat {
    #[cfg(feature = "workbook")]
    Workbook,
    Csv,
}

impl SourceFormat {
    pub fn key(&self) -> &'static str {
        match self {
            #[cfg(feature = "workbook")]
            Self::Workbook => "workbook",
            Self::Csv => "csv",
        }
    }

    pub fn extensions(&self) -> &[&str] {
        match self {
            #[cfg(feature = "workbook")]
            Self::Workbook => &["xlsx", "xlsm", "xlsb", "xls", "ods"],
            Self::Csv => &["csv"],
        }
    }

    pub fn detect(file_path: &Path) -> Option<SourceFormat> {
        let ext = file_path.extension()?.to_str()?.to_ascii_lowercase();
        ALL_FORMATS
            .iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
            .copied()
    }

    /// Load the rows of the source, each truncated to `column_bound` cells.
    fn load_rows(&self, descriptor: &SourceDescriptor) -> Result<Vec<SheetRow>> {
        match self {
            #[cfg(feature = "workbook")]
            Self::Workbook => load_workbook_rows(descriptor),
            Self::Csv => load_csv_rows(descriptor),
        }
    }
}

const ALL_FORMATS: &[SourceFormat] = &[
    #[cfg(feature = "workbook")]
    SourceFormat::Workbook,
    SourceFormat::Csv,
];

pub fn is_supported(file_path: &Path) -> bool {
    SourceFormat::detect(file_path).is_some()
}

// ---------------------------------------------------------------------------
// read_source
// ---------------------------------------------------------------------------

/// Read and validate one source.
///
/// Row-level validation failures are counted and reported to `sink`; only
/// problems with the source as a whole are returned as errors.
pub fn read_source(descriptor: &SourceDescriptor, sink: &dyn DiagnosticsSink) -> Result<SourceResult> {
    if descriptor.column_bound == 0 {
        return Err(SheetbookError::InvalidColumnBound(0));
    }
    let name = descriptor.identifier();

    if !descriptor.location.exists() {
        return Err(SheetbookError::SourceNotFound(name));
    }
    let format = SourceFormat::detect(&descriptor.location).ok_or_else(|| {
        SheetbookError::SourceUnreadable {
            file: name.clone(),
            reason: "unsupported file type".to_string(),
        }
    })?;

    let mut rows = format.load_rows(descriptor)?.into_iter();
    let header = rows.next().ok_or_else(|| SheetbookError::SourceEmpty(name.clone()))?;
    let keys = extract_headers(&header.cells, descriptor.column_bound, &name)?;

    let result = validate_rows(&name, &keys, rows, descriptor.schema.as_ref(), sink);
    sink.emit(&DiagnosticEvent::SourceRead {
        source: name,
        accepted: result.accepted,
        rejected: result.rejected,
    });
    Ok(result)
}

/// Turn the header row into canonical field names, one per bounded column.
pub fn extract_headers(header: &[Cell], column_bound: usize, source: &str) -> Result<Vec<String>> {
    let fail = |reason: String| SheetbookError::SchemaExtractionFailed {
        file: source.to_string(),
        reason,
    };

    if header.len() < column_bound {
        return Err(fail(format!(
            "header has {} columns, expected {column_bound}",
            header.len()
        )));
    }

    let mut keys = Vec::with_capacity(column_bound);
    let mut seen = HashSet::new();
    for (i, cell) in header.iter().take(column_bound).enumerate() {
        let raw = match cell {
            Cell::Empty | Cell::Error(_) => String::new(),
            other => other.to_string(),
        };
        let key = normalize_header(raw.trim_start_matches('\u{feff}'));
        if key.is_empty() {
            return Err(fail(format!("found empty header cell in column {}", i + 1)));
        }
        if !seen.insert(key.clone()) {
            return Err(fail(format!("duplicate header '{key}'")));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn validate_rows<I, V>(
    source: &str,
    keys: &[String],
    rows: I,
    validator: &V,
    sink: &dyn DiagnosticsSink,
) -> SourceResult
where
    I: Iterator<Item = SheetRow>,
    V: RowValidator + ?Sized,
{
    let mut result = SourceResult::default();

    for SheetRow { number, cells } in rows {
        let record: RowRecord = keys.iter().cloned().zip(cells).collect();
        match validator.validate(&record) {
            Ok(validated) => {
                result.records.push(validated);
                result.accepted += 1;
            }
            Err(e) => {
                result.rejected += 1;
                sink.emit(&DiagnosticEvent::RowRejected {
                    source: source.to_string(),
                    row: number,
                    detail: e.to_string(),
                });
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv_rows(descriptor: &SourceDescriptor) -> Result<Vec<SheetRow>> {
    let unreadable = |reason: String| SheetbookError::SourceUnreadable {
        file: descriptor.identifier(),
        reason,
    };

    let bytes = std::fs::read(&descriptor.location).map_err(|e| unreadable(e.to_string()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let bound = descriptor.column_bound;
    let mut rows = Vec::new();
    let mut next_line = 1;
    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record).map_err(|e| unreadable(e.to_string()))? {
        let (line, body) = match record.position() {
            Some(pos) => locate_record(&bytes, pos, rdr.position()),
            None => (next_line, 0),
        };

        // The csv reader drops blank lines; a sheet keeps them as empty rows.
        while next_line < line {
            rows.push(SheetRow {
                number: next_line,
                cells: vec![Cell::Empty; bound],
            });
            next_line += 1;
        }

        rows.push(SheetRow {
            number: line,
            cells: record.iter().take(bound).map(Cell::from_text).collect(),
        });
        next_line = line + body + 1;
    }
    Ok(rows)
}

/// Physical start line of a record and the number of line breaks inside it.
///
/// `start` may sit on blank lines the reader skipped, or on the line feed of
/// a preceding `\r\n`; those are counted here instead of by the reader.
fn locate_record(bytes: &[u8], start: &csv::Position, end: &csv::Position) -> (usize, usize) {
    let from = (start.byte() as usize).min(bytes.len());
    let to = (end.byte() as usize).clamp(from, bytes.len());
    let span = &bytes[from..to];

    let lead = span
        .iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .count();
    let skipped = span[..lead].iter().filter(|b| **b == b'\n').count();

    let body = &span[lead..];
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    let inner = body.iter().filter(|b| **b == b'\n').count();

    (start.line() as usize + skipped, inner)
}

// ---------------------------------------------------------------------------
// Workbook loader (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "workbook")]
fn load_workbook_rows(descriptor: &SourceDescriptor) -> Result<Vec<SheetRow>> {
    use calamine::Reader;

    let name = descriptor.identifier();
    let unreadable = |reason: String| SheetbookError::SourceUnreadable {
        file: name.clone(),
        reason,
    };

    // Cached cell values are read, never formula text.
    let mut workbook =
        calamine::open_workbook_auto(&descriptor.location).map_err(|e| unreadable(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let sheet = match &descriptor.sheet {
        SheetSelector::Named(sheet) => {
            if !sheet_names.contains(sheet) {
                return Err(unreadable(format!("no sheet named '{sheet}'")));
            }
            Some(sheet.clone())
        }
        SheetSelector::First => sheet_names.first().cloned(),
    };
    let Some(sheet) = sheet else {
        return Err(SheetbookError::SourceEmpty(name));
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| unreadable(e.to_string()))?;
    let Some((last_row, _)) = range.end() else {
        return Ok(Vec::new());
    };

    // Positions are absolute so row 1 of the sheet is always the header, even
    // when the used range starts further down or right.
    let bound = descriptor.column_bound as u32;
    let rows = (0..=last_row)
        .map(|r| SheetRow {
            number: r as usize + 1,
            cells: (0..bound)
                .map(|c| range.get_value((r, c)).map_or(Cell::Empty, cell_from_data))
                .collect(),
        })
        .collect();
    Ok(rows)
}

#[cfg(feature = "workbook")]
fn cell_from_data(data: &calamine::Data) -> Cell {
    use calamine::Data;

    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::String(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if dt.is_datetime() => dt
            .as_datetime()
            .map_or(Cell::Float(dt.as_f64()), Cell::DateTime),
        Data::DateTime(dt) => Cell::Float(dt.as_f64()),
        Data::DateTimeIso(s) => {
            crate::models::parse_iso_datetime(s).map_or_else(|| Cell::String(s.clone()), Cell::DateTime)
        }
        Data::DurationIso(s) => Cell::String(s.clone()),
        Data::Error(e) => Cell::Error(e.to_string()),
    }
}
