use thiserror::Error;

#[derive(Error, Debug)]
pub enum SheetbookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column bound must be at least 1, got {0}")]
    InvalidColumnBound(usize),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("{0}: file not found")]
    SourceNotFound(String),

    #[error("{file}: unreadable ({reason})")]
    SourceUnreadable { file: String, reason: String },

    #[error("{0}: sheet is empty")]
    SourceEmpty(String),

    #[error("{file}: {reason}")]
    SchemaExtractionFailed { file: String, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl SheetbookError {
    /// Errors that belong to a single source and must not abort a batch.
    pub fn is_source_level(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound(_)
                | Self::SourceUnreadable { .. }
                | Self::SourceEmpty(_)
                | Self::SchemaExtractionFailed { .. }
                | Self::Io(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SheetbookError>;
