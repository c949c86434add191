//! Input discovery: turn a directory into an ordered list of source reports.
//!
//! Filesystem enumeration order is unspecified and differs between
//! platforms, so the listing is sorted by file name before anything is
//! processed. Section order in the composite document and row order in the
//! summary both follow this list.

use crate::error::{BatchError, FileError};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One input PDF produced by the upstream report generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Full path to the PDF.
    pub path: PathBuf,
    /// File name without extension; becomes the section title and CSV key.
    pub identifier: String,
}

impl SourceReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identifier = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, identifier }
    }
}

/// Whether `path` has a `.pdf` extension (any case).
pub fn is_pdf_name(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// List every PDF directly inside `dir`, sorted by file name.
///
/// Sub-directories are not descended into.
pub fn discover_reports(dir: &Path) -> Result<Vec<SourceReport>, BatchError> {
    let entries = std::fs::read_dir(dir).map_err(|e| BatchError::InputDirectory {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::InputDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_pdf_name(&path) {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Discovered {} PDFs in {}", paths.len(), dir.display());

    Ok(paths.into_iter().map(SourceReport::new).collect())
}

/// Check that `path` is readable and starts with the `%PDF` magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), FileError> {
    let mut f = std::fs::File::open(path).map_err(|e| FileError::Unreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    f.read_exact(&mut magic).map_err(|e| FileError::Unreadable {
        path: path.to_path_buf(),
        detail: format!("too short to be a PDF: {e}"),
    })?;
    if &magic != b"%PDF" {
        return Err(FileError::Unreadable {
            path: path.to_path_buf(),
            detail: format!("bad magic bytes {magic:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_file_stem() {
        let r = SourceReport::new("/tmp/out/DB-1 Feeder.pdf");
        assert_eq!(r.identifier, "DB-1 Feeder");
    }

    #[test]
    fn pdf_extension_any_case() {
        assert!(is_pdf_name(Path::new("a.pdf")));
        assert!(is_pdf_name(Path::new("a.PDF")));
        assert!(!is_pdf_name(Path::new("a.pdf.bak")));
        assert!(!is_pdf_name(Path::new("a")));
    }

    #[test]
    fn discovery_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.pdf", "a.pdf", "b.PDF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let reports = discover_reports(dir.path()).unwrap();
        let ids: Vec<_> = reports.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let err = discover_reports(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, BatchError::InputDirectory { .. }));
    }

    #[test]
    fn magic_bytes_checked() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&good, b"%PDF-1.7\n").unwrap();
        std::fs::write(&bad, b"<html>").unwrap();
        assert!(validate_pdf(&good).is_ok());
        assert!(matches!(
            validate_pdf(&bad),
            Err(FileError::Unreadable { .. })
        ));
    }
}
