//! Error types for the pcad2docx library.
//!
//! Three tiers mirror the three ways a batch can go wrong:
//!
//! * [`BatchError`] — **Fatal**: the run cannot produce a valid artifact
//!   (template missing, composite merge failed, output not writable).
//!   Returned as `Err(BatchError)` from the top-level `convert*` and
//!   `extract*` functions. Nothing partial is written.
//!
//! * [`FileError`] — **Per-file**: one report could not be processed (PDF
//!   unreadable, every page failed to render). The file is left out of the
//!   composite and recorded in [`crate::output::FileReport`].
//!
//! * [`PageError`] — **Per-page**: a single page failed to render or yield
//!   text. The page is skipped; the rest of its file continues.

use crate::docx::DocxError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pcad2docx library.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The PDF directory does not exist or cannot be listed.
    #[error("Cannot read PDF directory '{path}': {source}")]
    InputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report template could not be found.
    #[error("Template document not found: '{path}'")]
    TemplateMissing { path: PathBuf },

    /// The base (style source) document could not be found.
    #[error("Base document not found: '{path}'")]
    BaseDocumentMissing { path: PathBuf },

    /// A template or base document exists but is not a usable .docx package.
    #[error("Document '{path}' is not a valid Word package: {source}")]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: DocxError,
    },

    // ── Composition errors ────────────────────────────────────────────────
    /// Merging one assembled document into the composite failed.
    #[error("Failed to merge '{identifier}' into the composite document: {source}")]
    ComposeFailed {
        identifier: String,
        #[source]
        source: DocxError,
    },

    /// Serialising the finished composite failed.
    #[error("Failed to serialise the composite document: {0}")]
    SerializeFailed(#[source] DocxError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not serialise the CSV summary.
    #[error("Failed to write summary '{path}': {detail}")]
    SummaryWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Point --pdfium-lib at a directory (or file) holding libpdfium, or let the\n\
CLI download it into its cache directory on first run.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller stopped the run between two files.
    #[error("Run cancelled after {completed}/{total} files")]
    Cancelled { completed: usize, total: usize },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a whole source file.
///
/// The file is skipped: it does not appear in the composite document and
/// contributes no row to the summary table.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The file is missing, unreadable, or pdfium refused to open it.
    #[error("'{path}' is not a readable PDF: {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// The file opened but not one of its pages could be rendered.
    #[error("none of the {pages} pages could be rendered")]
    NoRenderablePages { pages: usize },

    /// Fragment sizes could not be allocated.
    #[error("layout failed: {detail}")]
    Layout { detail: String },

    /// A fragment could not be PNG-encoded.
    #[error("page {page}: image encoding failed: {detail}")]
    Encode { page: usize, detail: String },

    /// The per-file document could not be built from the template.
    #[error("document assembly failed: {detail}")]
    Assembly { detail: String },
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Page text could not be extracted.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::TextFailed { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display() {
        let e = BatchError::Cancelled {
            completed: 2,
            total: 5,
        };
        assert!(e.to_string().contains("2/5"), "got: {e}");
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::RenderFailed {
            page: 4,
            detail: "bad xref".into(),
        };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("Page 4"));
    }

    #[test]
    fn file_error_serialises() {
        let e = FileError::NoRenderablePages { pages: 3 };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("NoRenderablePages"));
    }

    #[test]
    fn compose_failed_names_the_report() {
        let e = BatchError::ComposeFailed {
            identifier: "C-101".into(),
            source: DocxError::MissingStyle {
                style_id: "Heading9".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("C-101"));
    }
}
