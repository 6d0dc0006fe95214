//! # roster-source
//!
//! Turns CSV exports into the local dataset: decode, parse, map each row to a
//! [`LogicalRecord`] with a stable key. Sources are read in configured order
//! and their records concatenated.

pub mod error;
pub mod mapping;
pub mod reader;

use std::path::{Path, PathBuf};

use roster_core::{LogicalRecord, SourceConfig, SourceKind};

pub use error::SourceError;
pub use reader::{CsvRow, CsvTable};

/// Per-source counts, for logging and `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub path: PathBuf,
    pub kind: SourceKind,
    /// The file did not exist; it contributed nothing.
    pub missing: bool,
    pub rows: usize,
    pub records: usize,
    pub skipped: usize,
}

/// All records of one run, in source order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<LogicalRecord>,
    pub sources: Vec<SourceStats>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured sources whose file did not exist.
    pub fn missing_sources(&self) -> impl Iterator<Item = &Path> {
        self.sources
            .iter()
            .filter(|s| s.missing)
            .map(|s| s.path.as_path())
    }

    /// Every configured source was present. Deletes are held back otherwise.
    pub fn is_complete(&self) -> bool {
        self.missing_sources().next().is_none()
    }
}

/// Read every source. Relative paths resolve against `base_dir`.
///
/// A missing file is logged and skipped, and the dataset is marked
/// incomplete. Unreadable or malformed files fail the whole load.
pub fn load_dataset(sources: &[SourceConfig], base_dir: &Path) -> Result<Dataset, SourceError> {
    let mut dataset = Dataset::default();
    for source in sources {
        let (records, stats) = load_source(source, base_dir)?;
        dataset.records.extend(records);
        dataset.sources.push(stats);
    }
    Ok(dataset)
}

/// Read and map a single source.
pub fn load_source(
    source: &SourceConfig,
    base_dir: &Path,
) -> Result<(Vec<LogicalRecord>, SourceStats), SourceError> {
    let path = resolve(&source.path, base_dir);
    let mut stats = SourceStats {
        path: path.clone(),
        kind: source.kind,
        missing: false,
        rows: 0,
        records: 0,
        skipped: 0,
    };
    if !path.exists() {
        tracing::warn!("file {} not found", path.display());
        stats.missing = true;
        return Ok((Vec::new(), stats));
    }

    tracing::info!("processing CSV file {}", path.display());
    let table = reader::read_file(&path, source.encoding)?;
    stats.rows = table.rows.len();
    stats.skipped = table.skipped;

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        match mapping::map_row(source.kind, row, source.key_column.as_deref()) {
            Some(record) => records.push(record),
            None => {
                tracing::debug!("{}:{}: nothing to map", path.display(), row.line);
                stats.skipped += 1;
            }
        }
    }
    stats.records = records.len();
    tracing::info!(
        "{}: {} records ({} rows skipped)",
        path.display(),
        stats.records,
        stats.skipped
    );
    Ok((records, stats))
}

fn resolve(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
