//! Diagnostic events emitted while reading sources.
//!
//! Readers never log directly. They hand a [`DiagnosticEvent`] to an injected
//! [`DiagnosticsSink`]; the CLI wires in [`TracingSink`], tests use
//! [`MemorySink`].

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// A data row failed schema validation and was skipped.
    RowRejected {
        source: String,
        row: usize,
        detail: String,
    },
    /// A source was scanned to the end.
    SourceRead {
        source: String,
        accepted: usize,
        rejected: usize,
    },
    /// A source could not be read at all.
    SourceFailed { source: String, reason: String },
    BatchCompleted {
        sources: usize,
        failed: usize,
        records: usize,
    },
}

impl DiagnosticEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::RowRejected { .. } | Self::SourceRead { .. } => Severity::Debug,
            Self::BatchCompleted { .. } => Severity::Info,
            Self::SourceFailed { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowRejected { source, row, detail } => {
                write!(f, "{source} row {row}: {detail}")
            }
            Self::SourceRead {
                source,
                accepted,
                rejected,
            } => write!(f, "{source}: {accepted} accepted, {rejected} rejected"),
            Self::SourceFailed { source, reason } => {
                write!(f, "Error processing {source}: {reason}")
            }
            Self::BatchCompleted {
                sources,
                failed,
                records,
            } => write!(f, "Batch finished: {sources} sources, {failed} failed, {records} records"),
        }
    }
}

/// Receiver for diagnostic events. Implementations must not panic.
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, event: &DiagnosticEvent);
}

/// Forwards events to the `tracing` subscriber with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::RowRejected { source, row, detail } => {
                debug!(source = %source, row = *row, "Validation error: {detail}");
            }
            DiagnosticEvent::SourceRead {
                source,
                accepted,
                rejected,
            } => {
                debug!(source = %source, accepted = *accepted, rejected = *rejected, "Source read");
            }
            DiagnosticEvent::SourceFailed { source, reason } => {
                error!(source = %source, "Error processing source: {reason}");
            }
            DiagnosticEvent::BatchCompleted {
                sources,
                failed,
                records,
            } => {
                info!(sources = *sources, failed = *failed, records = *records, "Batch finished");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn emit(&self, _event: &DiagnosticEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events()
            .iter()
            .filter(|e| e.severity() == severity)
            .count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn emit(&self, event: &DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
