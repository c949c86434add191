//! # pcad2docx
//!
//! Batch-convert cable-sizing report PDFs into one Word document, and
//! extract their headline values into a CSV summary.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF directory (sorted)
//!  │
//!  ├─ 1. Render   rasterise each page via pdfium, one page at a time
//!  ├─ 2. Trim     strip the report frame and the blank tail of the page
//!  ├─ 3. Layout   share 9.5 in of page height between the file's fragments
//!  ├─ 4. Assemble fill the template: title + one paragraph of pictures
//!  └─ 5. Compose  append every assembled document to the base document
//!                 → concatenated.docx
//!
//!  └─ Extract     page text → regex fields → 0cable_info.csv
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pcad2docx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .template_path("template.docx")
//!         .base_path("default.docx")
//!         .pdfium_library("/opt/pdfium/lib")
//!         .build()?;
//!     let output = convert("reports/", &config).await?;
//!     eprintln!(
//!         "{} of {} reports → {}",
//!         output.stats.assembled_files,
//!         output.stats.total_files,
//!         output.output_path.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pcad2docx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pcad2docx = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod summary;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BlankRowRule, ConversionConfig, ConversionConfigBuilder, PageMargins, ReportGeometry};
pub use convert::{convert, convert_sync, convert_with};
pub use error::{BatchError, FileError, PageError};
pub use output::{ConversionOutput, ConversionStats, FileReport, FileStatus, SummaryOutput};
pub use pipeline::render::{PdfBackend, PdfiumBackend};
pub use progress::{BatchProgressCallback, NoopProgressCallback, Phase, ProgressCallback};
pub use summary::{extract_summary, extract_summary_with, CableRecord, Verdict};
pub use worker::{spawn_pipeline, PipelineHandle, PipelineOutcome, PipelineRequest, ProgressEvent, RunControl};
