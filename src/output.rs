//! Result types returned by the batch phases.

use crate::error::{BatchError, FileError, PageError};
use crate::summary::CableRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of the convert phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the composite document was written.
    pub output_path: PathBuf,
    /// One entry per discovered PDF, in processing order.
    pub files: Vec<FileReport>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Identifiers of the reports present in the composite, in order.
    pub fn included(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.is_included())
            .map(|f| f.identifier.as_str())
    }
}

/// What happened to one source PDF during conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub identifier: String,
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileReport {
    /// Whether the file has a section in the composite.
    pub fn is_included(&self) -> bool {
        matches!(self.status, FileStatus::Assembled { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// A title section was built for the file.
    Assembled {
        /// Images embedded, in page order.
        fragments: usize,
        /// Pages that failed to render.
        skipped_pages: Vec<PageError>,
        /// Whether the template placeholder was found and retitled.
        title_found: bool,
    },
    /// The file was left out of the composite.
    Skipped { error: FileError },
}

/// Counters for one convert run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_files: usize,
    pub assembled_files: usize,
    pub skipped_files: usize,
    /// Pages across all readable PDFs.
    pub total_pages: usize,
    /// Pages that failed to render.
    pub failed_pages: usize,
    /// Pages rendered but discarded as blank after trimming.
    pub blank_pages: usize,
    /// Images embedded in the composite.
    pub fragments: usize,
    pub total_duration_ms: u64,
    pub compose_duration_ms: u64,
}

/// Outcome of the extract phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    /// Where the CSV was written.
    pub output_path: PathBuf,
    /// One row per readable PDF, in processing order.
    pub records: Vec<CableRecord>,
    /// PDFs that produced no row.
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub identifier: String,
    pub error: FileError,
}

/// Write `bytes` to `path` via a temporary file in the same directory, so
/// an existing file is either fully replaced or left untouched.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BatchError> {
    let fail = |source| BatchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}
