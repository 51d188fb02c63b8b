use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, SheetbookError};
use crate::models::Sentinel;
use crate::reader::{is_supported, SheetSelector, SourceDescriptor};
use crate::schema::{FieldDef, Schema};

const MISSING_OR_NA: &[Sentinel] = &[Sentinel::Missing, Sentinel::Na];

// ---------------------------------------------------------------------------
// Dataset kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dataset {
    Transaction,
    Category,
    SubCategory,
    Income,
    Investment,
}

impl Dataset {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Category => "category",
            Self::SubCategory => "sub_category",
            Self::Income => "income",
            Self::Investment => "investment",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Transaction => "Expense transactions",
            Self::Category => "Expense categories",
            Self::SubCategory => "Expense sub-categories",
            Self::Income => "Income",
            Self::Investment => "Investments",
        }
    }

    /// Directory under the data dir holding this dataset's workbooks.
    pub fn group(&self) -> &'static str {
        match self {
            Self::Transaction | Self::Category | Self::SubCategory => "expense",
            Self::Income => "income",
            Self::Investment => "investment",
        }
    }

    pub fn sheet(&self) -> &'static str {
        match self {
            Self::Transaction => "Transaction",
            Self::Category => "Category",
            Self::SubCategory => "Sub Category",
            Self::Income => "Income",
            Self::Investment => "Investment",
        }
    }

    pub fn column_bound(&self) -> usize {
        match self {
            Self::Transaction => 15,
            Self::Category => 1,
            Self::SubCategory => 2,
            Self::Income | Self::Investment => 2,
        }
    }

    pub fn schema(&self) -> Result<Schema> {
        match self {
            Self::Transaction => transaction_schema(),
            Self::Category => Schema::new("category", vec![FieldDef::text("name")]),
            Self::SubCategory => Schema::new(
                "sub_category",
                vec![FieldDef::text("name"), FieldDef::text("category_name")],
            ),
            Self::Income => Ok(Schema::passthrough("income")),
            Self::Investment => Ok(Schema::passthrough("investment")),
        }
    }

    /// Supported spreadsheet files directly inside `<data_dir>/<group>/`,
    /// sorted by path. Lock files and hidden files are skipped.
    pub fn resolve_sources(&self, data_dir: &Path) -> Result<Vec<PathBuf>> {
        let dir = data_dir.join(self.group());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.') || n.starts_with("~$"));
            if path.is_file() && !hidden && is_supported(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Uniform descriptors for `locations`. Workbooks must contain `sheet`,
    /// or this dataset's own sheet when none is given.
    pub fn descriptors(&self, locations: &[PathBuf], sheet: Option<&str>) -> Result<Vec<SourceDescriptor>> {
        let schema = Arc::new(self.schema()?);
        let selector = SheetSelector::Named(sheet.unwrap_or(self.sheet()).to_string());
        Ok(locations
            .iter()
            .map(|l| {
                SourceDescriptor::new(l.clone(), self.column_bound(), schema.clone())
                    .with_sheet(selector.clone())
            })
            .collect())
    }
}

pub const ALL_DATASETS: &[Dataset] = &[
    Dataset::Transaction,
    Dataset::Category,
    Dataset::SubCategory,
    Dataset::Income,
    Dataset::Investment,
];

pub fn get_by_key(key: &str) -> Result<Dataset> {
    let wanted = key.trim().to_lowercase().replace('-', "_");
    ALL_DATASETS
        .iter()
        .find(|d| d.key() == wanted)
        .copied()
        .ok_or_else(|| SheetbookError::UnknownDataset(key.to_string()))
}

fn transaction_schema() -> Result<Schema> {
    Schema::new(
        "transaction",
        vec![
            FieldDef::date("date"),
            FieldDef::text("category"),
            FieldDef::text("sub_category"),
            FieldDef::literal("product_or_service", &["Product", "Service"]).sentinels(MISSING_OR_NA),
            FieldDef::text("product_or_service_name").sentinels(&[Sentinel::Missing]),
            FieldDef::text("brand").sentinels(MISSING_OR_NA),
            FieldDef::integer("quantity_or_duration").sentinels(MISSING_OR_NA),
            FieldDef::text("unit").sentinels(MISSING_OR_NA),
            FieldDef::float("price").sentinels(MISSING_OR_NA),
            FieldDef::text("platform_or_location").sentinels(MISSING_OR_NA),
            FieldDef::literal("need_or_want", &["Need", "Want"]),
            FieldDef::literal("transaction_mode", &["Online", "Offline"]).optional(),
            FieldDef::literal("personal_or_dearness", &["Personal", "Dearness"]),
            FieldDef::text("relation").optional(),
            FieldDef::text("details").sentinels(MISSING_OR_NA).optional(),
        ],
    )
}
