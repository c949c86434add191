//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a directory. Progress is coarse:
//! one percentage per finished file, never per page.
//!
//! # Example
//!
//! ```rust
//! use pcad2docx::{BatchProgressCallback, ConversionConfig, Phase};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BatchProgressCallback for Printer {
//!     fn on_file_complete(&self, phase: Phase, completed: usize, total: usize, percent: u8) {
//!         eprintln!("{phase}: {completed}/{total} ({percent}%)");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A batch phase reporting its own 0–100 progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// PDFs → composite Word document.
    Convert,
    /// PDFs → CSV summary.
    Extract,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Convert => f.write_str("convert"),
            Phase::Extract => f.write_str("extract"),
        }
    }
}

/// Integer percentage of `completed` out of `total`, rounded half up.
///
/// An empty batch is complete by definition and reports 100.
pub fn percent_complete(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((completed * 200 + total) / (2 * total)) as u8
}

/// Called by the pipeline as it works through each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline runs on a worker thread, hence
/// `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file of a phase.
    fn on_phase_start(&self, phase: Phase, total_files: usize) {
        let _ = (phase, total_files);
    }

    /// Called before a file's first page is touched.
    ///
    /// * `index` — 1-based position in the sorted file list
    fn on_file_start(&self, phase: Phase, index: usize, total_files: usize, identifier: &str) {
        let _ = (phase, index, total_files, identifier);
    }

    /// Called when a page is skipped (render or text failure).
    fn on_page_skipped(&self, identifier: &str, page_num: usize, error: &str) {
        let _ = (identifier, page_num, error);
    }

    /// Called when a whole file is left out of the phase's output.
    fn on_file_skipped(&self, phase: Phase, identifier: &str, error: &str) {
        let _ = (phase, identifier, error);
    }

    /// Called after every file, processed or skipped.
    fn on_file_complete(&self, phase: Phase, completed: usize, total_files: usize, percent: u8) {
        let _ = (phase, completed, total_files, percent);
    }

    /// Called once after the phase's output has been written.
    fn on_phase_complete(&self, phase: Phase, succeeded: usize, total_files: usize) {
        let _ = (phase, succeeded, total_files);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
