//! Parallel fan-out over many sources sharing one schema.
//!
//! Each source is read by a worker from a bounded pool of scoped threads.
//! Workers send their outcome over a channel to the calling thread, which is
//! the only place results are merged. A failing (or panicking) source turns
//! into a `Failed` stats entry and never affects its siblings.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::error::{Result, SheetbookError};
use crate::models::ValidatedRecord;
use crate::reader::{read_source, SourceDescriptor, SourceResult};
use crate::schema::Schema;

/// Default pool size is this many workers per available CPU.
pub const WORKERS_PER_CPU: usize = 2;

pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus * WORKERS_PER_CPU
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Completed {
        accepted: usize,
        rejected: usize,
        success_rate: f64,
    },
    Failed {
        reason: String,
    },
}

impl SourceOutcome {
    /// Success rate in percent; a failed source reports `0`.
    pub fn success_rate(&self) -> f64 {
        match self {
            Self::Completed { success_rate, .. } => *success_rate,
            Self::Failed { .. } => 0.0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<&SourceResult> for SourceOutcome {
    fn from(result: &SourceResult) -> Self {
        Self::Completed {
            accepted: result.accepted,
            rejected: result.rejected,
            success_rate: result.success_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStat {
    pub source: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Records of every completed source, sources in completion order.
    pub records: Vec<ValidatedRecord>,
    /// One entry per submitted source, in completion order.
    pub stats: Vec<SourceStat>,
}

impl BatchResult {
    /// `(source, success rate)` pairs, failures reported as `0`.
    pub fn rates(&self) -> Vec<(&str, f64)> {
        self.stats
            .iter()
            .map(|s| (s.source.as_str(), s.outcome.success_rate()))
            .collect()
    }

    pub fn stat(&self, source: &str) -> Option<&SourceStat> {
        self.stats.iter().find(|s| s.source == source)
    }

    pub fn failed_count(&self) -> usize {
        self.stats.iter().filter(|s| s.outcome.is_failed()).count()
    }
}

struct Completion {
    source: String,
    outcome: Result<SourceResult>,
}

pub struct BatchReader {
    workers: usize,
    sink: Arc<dyn DiagnosticsSink>,
}

impl BatchReader {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            workers: default_workers(),
            sink,
        }
    }

    /// Cap the pool at `workers` threads (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Build uniform descriptors for `locations` and read them as one batch.
    pub fn read_locations<I, P>(
        &self,
        locations: I,
        column_bound: usize,
        schema: Arc<Schema>,
    ) -> Result<BatchResult>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources: Vec<SourceDescriptor> = locations
            .into_iter()
            .map(|l| SourceDescriptor::new(l, column_bound, schema.clone()))
            .collect();
        self.read_batch(&sources)
    }

    /// Read every source and merge the results.
    ///
    /// Only caller errors (zero column bound, mixed schemas or bounds) are
    /// returned as `Err`, and they are detected before any file is opened.
    pub fn read_batch(&self, sources: &[SourceDescriptor]) -> Result<BatchResult> {
        check_uniform(sources)?;

        let mut batch = BatchResult::default();
        if sources.is_empty() {
            return Ok(batch);
        }

        let named = with_unique_names(sources);
        let sources = named.as_slice();
        let pool = self.workers.min(sources.len());
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<Completion>();
        let sink: &dyn DiagnosticsSink = self.sink.as_ref();

        std::thread::scope(|scope| {
            for _ in 0..pool {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(source) = sources.get(i) else {
                        break;
                    };
                    let completion = Completion {
                        source: source.identifier(),
                        outcome: run_isolated(source, sink),
                    };
                    if tx.send(completion).is_err() {
                        break;
                    }
                });
            }
            // Workers hold the remaining senders; the loop ends when all exit.
            drop(tx);

            for completion in rx {
                merge(&mut batch, completion, sink);
            }
        });

        sink.emit(&DiagnosticEvent::BatchCompleted {
            sources: batch.stats.len(),
            failed: batch.failed_count(),
            records: batch.records.len(),
        });
        Ok(batch)
    }
}

fn check_uniform(sources: &[SourceDescriptor]) -> Result<()> {
    let Some(first) = sources.first() else {
        return Ok(());
    };
    if first.column_bound == 0 {
        return Err(SheetbookError::InvalidColumnBound(0));
    }
    for source in &sources[1..] {
        if source.column_bound != first.column_bound {
            return Err(SheetbookError::InvalidBatch(format!(
                "{} uses column bound {}, expected {}",
                source.identifier(),
                source.column_bound,
                first.column_bound
            )));
        }
        if !Arc::ptr_eq(&source.schema, &first.schema) && source.schema != first.schema {
            return Err(SheetbookError::InvalidBatch(format!(
                "{} uses schema '{}', expected '{}'",
                source.identifier(),
                source.schema.name(),
                first.schema.name()
            )));
        }
    }
    Ok(())
}

/// Sources sharing a file name are reported under their full path so each
/// stats entry stays addressable.
fn with_unique_names(sources: &[SourceDescriptor]) -> Vec<SourceDescriptor> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for source in sources {
        *seen.entry(source.identifier()).or_default() += 1;
    }
    sources
        .iter()
        .map(|source| {
            if seen.get(&source.identifier()).copied().unwrap_or(0) > 1 {
                source
                    .clone()
                    .with_name(source.location.display().to_string())
            } else {
                source.clone()
            }
        })
        .collect()
}

fn run_isolated(source: &SourceDescriptor, sink: &dyn DiagnosticsSink) -> Result<SourceResult> {
    panic::catch_unwind(AssertUnwindSafe(|| read_source(source, sink))).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(SheetbookError::Other(format!("worker panicked: {msg}")))
    })
}

fn merge(batch: &mut BatchResult, completion: Completion, sink: &dyn DiagnosticsSink) {
    let Completion { source, outcome } = completion;
    match outcome {
        Ok(mut result) => {
            let outcome = SourceOutcome::from(&result);
            batch.records.append(&mut result.records);
            batch.stats.push(SourceStat { source, outcome });
        }
        Err(e) => {
            sink.emit(&DiagnosticEvent::SourceFailed {
                source: source.clone(),
                reason: e.to_string(),
            });
            batch.stats.push(SourceStat {
                source,
                outcome: SourceOutcome::Failed {
                    reason: e.to_string(),
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MemorySink, NullSink, Severity};
    use crate::models::Value;
    use crate::schema::FieldDef;
    use std::path::Path;

    fn category_schema() -> Arc<Schema> {
        Arc::new(Schema::new("category", vec![FieldDef::text("name")]).unwrap())
    }

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn reader() -> BatchReader {
        BatchReader::new(Arc::new(NullSink))
    }

    #[test]
    fn test_same_file_name_in_two_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2023")).unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        let old = write_csv(&dir.path().join("2023"), "categories.csv", "Name\nFood\n");
        let new = write_csv(&dir.path().join("2024"), "categories.csv", "Name\nTravel\n7\n");
        let single = write_csv(dir.path(), "other.csv", "Name\nRent\n");

        let batch = reader()
            .read_locations(vec![old.clone(), new.clone(), single], 1, category_schema())
            .unwrap();

        assert_eq!(batch.stats.len(), 3);
        let old_stat = batch.stat(&old.display().to_string()).unwrap();
        let new_stat = batch.stat(&new.display().to_string()).unwrap();
        assert_eq!(old_stat.outcome.success_rate(), 100.0);
        assert_eq!(new_stat.outcome.success_rate(), 50.0);
        assert!(batch.stat("other.csv").is_some());
        assert!(batch.stat("categories.csv").is_none());
    }

    #[test]
    fn test_default_workers_is_positive() {
        assert!(default_workers() >= WORKERS_PER_CPU);
        assert_eq!(reader().with_workers(0).workers(), 1);
    }

    #[test]
    fn test_batch_with_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let existing = write_csv(dir.path(), "existing.csv", "Name\nClothing\n1\nFood\n");
        let missing = dir.path().join("missing.csv");
        let sink = Arc::new(MemorySink::new());

        let batch = BatchReader::new(sink.clone())
            .read_locations(vec![existing, missing], 1, category_schema())
            .unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.stats.len(), 2);
        let mut rates = batch.rates();
        rates.sort_by(|a, b| a.0.cmp(b.0));
        assert_eq!(rates, vec![("existing.csv", 66.67), ("missing.csv", 0.0)]);
        assert!(batch.stat("missing.csv").unwrap().outcome.is_failed());
        assert_eq!(batch.failed_count(), 1);
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn test_stats_len_matches_sources_regardless_of_failures() {
        let dir = tempfile::tempdir().unwrap();
        let locations = vec![
            write_csv(dir.path(), "a.csv", "Name\nA\n"),
            write_csv(dir.path(), "empty.csv", ""),
            write_csv(dir.path(), "blank_header.csv", ",\nA\n"),
            write_csv(dir.path(), "notes.txt", "Name\nA\n"),
            dir.path().join("gone.csv"),
            write_csv(dir.path(), "headers_only.csv", "Name\n"),
        ];
        let batch = reader()
            .with_workers(2)
            .read_locations(locations.clone(), 1, category_schema())
            .unwrap();
        assert_eq!(batch.stats.len(), locations.len());
        assert_eq!(batch.failed_count(), 4);
        assert_eq!(batch.records.len(), 1);

        let headers_only = batch.stat("headers_only.csv").unwrap();
        assert_eq!(
            headers_only.outcome,
            SourceOutcome::Completed {
                accepted: 0,
                rejected: 0,
                success_rate: 0.0
            }
        );
    }

    #[test]
    fn test_intra_source_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", "Name\nA1\nA2\nA3\n");
        let b = write_csv(dir.path(), "b.csv", "Name\nB1\nB2\n");
        let batch = reader()
            .read_locations(vec![a, b], 1, category_schema())
            .unwrap();

        let names: Vec<String> = batch
            .records
            .iter()
            .filter_map(|r| match r.get("name") {
                Some(Value::Text(t)) => Some(t.clone()),
                _ => None,
            })
            .collect();
        let a_names: Vec<&String> = names.iter().filter(|n| n.starts_with('A')).collect();
        let b_names: Vec<&String> = names.iter().filter(|n| n.starts_with('B')).collect();
        assert_eq!(a_names, vec!["A1", "A2", "A3"]);
        assert_eq!(b_names, vec!["B1", "B2"]);
    }

    #[test]
    fn test_many_sources_with_small_pool() {
        let dir = tempfile::tempdir().unwrap();
        let locations: Vec<PathBuf> = (0..20)
            .map(|i| write_csv(dir.path(), &format!("s{i}.csv"), "Name\nX\nY\n"))
            .collect();
        let batch = reader()
            .with_workers(3)
            .read_locations(locations, 1, category_schema())
            .unwrap();
        assert_eq!(batch.stats.len(), 20);
        assert_eq!(batch.records.len(), 40);
        assert!(batch.rates().iter().all(|(_, r)| *r == 100.0));
    }

    #[test]
    fn test_empty_batch() {
        let batch = reader().read_batch(&[]).unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.stats.is_empty());
    }

    #[test]
    fn test_mixed_column_bounds_rejected_before_io() {
        let schema = category_schema();
        let sources = vec![
            SourceDescriptor::new("/nonexistent/a.csv", 1, schema.clone()),
            SourceDescriptor::new("/nonexistent/b.csv", 2, schema),
        ];
        let sink = Arc::new(MemorySink::new());
        let err = BatchReader::new(sink.clone()).read_batch(&sources).unwrap_err();
        assert!(matches!(err, SheetbookError::InvalidBatch(_)));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_mixed_schemas_rejected() {
        let other = Arc::new(Schema::passthrough("income"));
        let sources = vec![
            SourceDescriptor::new("/nonexistent/a.csv", 1, category_schema()),
            SourceDescriptor::new("/nonexistent/b.csv", 1, other),
        ];
        let err = reader().read_batch(&sources).unwrap_err();
        assert!(matches!(err, SheetbookError::InvalidBatch(_)));
    }

    #[test]
    fn test_equal_schemas_in_separate_arcs_are_uniform() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", "Name\nA\n");
        let b = write_csv(dir.path(), "b.csv", "Name\nB\n");
        let sources = vec![
            SourceDescriptor::new(a, 1, category_schema()),
            SourceDescriptor::new(b, 1, category_schema()),
        ];
        let batch = reader().read_batch(&sources).unwrap();
        assert_eq!(batch.records.len(), 2);
    }

    #[test]
    fn test_zero_column_bound_rejected() {
        let err = reader()
            .read_locations(vec!["/nonexistent/a.csv"], 0, category_schema())
            .unwrap_err();
        assert!(matches!(err, SheetbookError::InvalidColumnBound(0)));
    }

    #[test]
    fn test_batch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", "Name\nA\n1\n");
        let first = reader().read_locations(vec![a.clone()], 1, category_schema()).unwrap();
        let second = reader().read_locations(vec![a], 1, category_schema()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stats_serialize_with_status_tag() {
        let stat = SourceStat {
            source: "missing.xlsx".into(),
            outcome: SourceOutcome::Failed {
                reason: "missing.xlsx: file not found".into(),
            },
        };
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["source"], "missing.xlsx");
        assert_eq!(json["status"], "failed");
    }
}
