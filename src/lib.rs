//! Validated ingestion of personal finance spreadsheets.
//!
//! [`reader::read_source`] reads one sheet, validating every data row against
//! a [`schema::Schema`]; [`batch::BatchReader`] fans a set of sources out over
//! a worker pool and merges their records and per-source statistics.

pub mod batch;
pub mod datasets;
pub mod diagnostics;
pub mod error;
pub mod fmt;
pub mod logging;
pub mod models;
pub mod reader;
pub mod schema;
pub mod settings;

pub use batch::{BatchReader, BatchResult, SourceOutcome, SourceStat};
pub use diagnostics::{DiagnosticEvent, DiagnosticsSink, MemorySink, Severity, TracingSink};
pub use error::{Result, SheetbookError};
pub use models::{Cell, Sentinel, ValidatedRecord, Value};
pub use reader::{read_source, SheetSelector, SourceDescriptor, SourceResult};
pub use schema::{FieldDef, FieldType, Schema};
