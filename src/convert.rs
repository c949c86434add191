//! Convert phase: a directory of report PDFs → one composite Word document.
//!
//! Every report is built completely (render, trim, lay out, assemble)
//! before the next one starts, and nothing is merged until all reports are
//! built. Only the composite is written to disk, atomically, so a failed
//! run leaves any previous output untouched.

use crate::config::ConversionConfig;
use crate::docx::{self, AssembledDocument, CompositeBuilder, FragmentImage, ReportTemplate};
use crate::error::{BatchError, FileError, PageError};
use crate::output::{write_atomic, ConversionOutput, ConversionStats, FileReport, FileStatus};
use crate::pipeline::input::{self, SourceReport};
use crate::pipeline::render::{PdfBackend, PdfiumBackend};
use crate::pipeline::{encode, layout, trim};
use crate::progress::{percent_complete, Phase};
use crate::worker::RunControl;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert every PDF in `dir`, binding pdfium on a blocking worker thread.
///
/// # Errors
/// Returns `Err(BatchError)` only for fatal errors: missing or malformed
/// template/base document, unreadable directory, merge or write failure.
/// Unreadable PDFs and failed pages are recorded in the output instead.
pub async fn convert(
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BatchError> {
    let dir = dir.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let backend = PdfiumBackend::bind(config.pdfium_library.as_deref())?;
        convert_with(&backend, &dir, &config, &RunControl::new())
    })
    .await
    .map_err(|e| BatchError::Internal(format!("conversion worker failed: {e}")))?
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(dir, config))
}

/// Run the convert phase against an explicit backend on the current thread.
///
/// `control` is checked before each file; a stopped run returns
/// [`BatchError::Cancelled`] without writing anything.
pub fn convert_with<B: PdfBackend + ?Sized>(
    backend: &B,
    dir: &Path,
    config: &ConversionConfig,
    control: &RunControl,
) -> Result<ConversionOutput, BatchError> {
    let total_start = Instant::now();
    info!("Converting reports in {}", dir.display());

    // ── Step 1: Load the fixed documents ─────────────────────────────────
    let template = ReportTemplate::load(&config.template_path)?;
    let mut composite = CompositeBuilder::load(&config.base_path)?;

    // ── Step 2: Discover inputs ──────────────────────────────────────────
    let reports = input::discover_reports(dir)?;
    let total = reports.len();
    info!("Found {} PDFs", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_start(Phase::Convert, total);
    }

    // ── Step 3: Build one document per report ────────────────────────────
    let mut stats = ConversionStats {
        total_files: total,
        ..ConversionStats::default()
    };
    let mut assembled: Vec<AssembledDocument> = Vec::with_capacity(total);
    let mut files: Vec<FileReport> = Vec::with_capacity(total);

    for (i, report) in reports.iter().enumerate() {
        if control.is_stopped() {
            info!("Stopped before '{}'", report.identifier);
            return Err(BatchError::Cancelled {
                completed: i,
                total,
            });
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(Phase::Convert, i + 1, total, &report.identifier);
        }

        let status = match build_report(backend, report, &template, config, &mut stats) {
            Ok(built) => {
                let status = FileStatus::Assembled {
                    fragments: built.document.images,
                    skipped_pages: built.skipped_pages,
                    title_found: built.document.title_found,
                };
                stats.assembled_files += 1;
                stats.fragments += built.document.images;
                assembled.push(built.document);
                status
            }
            Err(error) => {
                warn!("Skipping '{}': {}", report.identifier, error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_skipped(Phase::Convert, &report.identifier, &error.to_string());
                }
                stats.skipped_files += 1;
                FileStatus::Skipped { error }
            }
        };
        files.push(FileReport {
            identifier: report.identifier.clone(),
            path: report.path.clone(),
            status,
        });

        if let Some(ref cb) = config.progress_callback {
            cb.on_file_complete(Phase::Convert, i + 1, total, percent_complete(i + 1, total));
        }
    }

    // ── Step 4: Merge in order ───────────────────────────────────────────
    let compose_start = Instant::now();
    for document in &assembled {
        composite
            .append(document)
            .map_err(|source| BatchError::ComposeFailed {
                identifier: document.identifier.clone(),
                source,
            })?;
    }
    let bytes = composite
        .finish()
        .and_then(|package| package.to_bytes())
        .map_err(BatchError::SerializeFailed)?;
    stats.compose_duration_ms = compose_start.elapsed().as_millis() as u64;

    // ── Step 5: Write ────────────────────────────────────────────────────
    let output_path = dir.join(&config.output_file_name);
    write_atomic(&output_path, &bytes)?;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Wrote {} ({} of {} reports, {} images) in {}ms",
        output_path.display(),
        stats.assembled_files,
        total,
        stats.fragments,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_complete(Phase::Convert, stats.assembled_files, total);
    }

    Ok(ConversionOutput {
        output_path,
        files,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct BuiltReport {
    document: AssembledDocument,
    skipped_pages: Vec<PageError>,
}

/// Render, trim, lay out and assemble one report.
fn build_report<B: PdfBackend + ?Sized>(
    backend: &B,
    report: &SourceReport,
    template: &ReportTemplate,
    config: &ConversionConfig,
    stats: &mut ConversionStats,
) -> Result<BuiltReport, FileError> {
    input::validate_pdf(&report.path)?;
    let pages = backend.page_count(&report.path)?;
    stats.total_pages += pages;
    debug!("'{}': {} pages", report.identifier, pages);

    // One page raster alive at a time; only the trimmed fragments are kept.
    let mut fragments = Vec::new();
    let mut skipped_pages = Vec::new();
    let mut rendered = 0usize;
    for page_num in 1..=pages {
        match backend.render_page(&report.path, page_num, config.dpi) {
            Ok(image) => {
                rendered += 1;
                match trim::trim_page(&image, page_num, &config.geometry, config.dpi) {
                    Some(fragment) => fragments.push(fragment),
                    None => stats.blank_pages += 1,
                }
            }
            Err(e) => {
                warn!("'{}': skipping page {}: {}", report.identifier, page_num, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_skipped(&report.identifier, e.page(), &e.to_string());
                }
                stats.failed_pages += 1;
                skipped_pages.push(e);
            }
        }
    }
    if rendered == 0 {
        return Err(FileError::NoRenderablePages { pages });
    }

    let layouts = layout::allocate(
        &fragments,
        config.target_height_emu(),
        config.geometry.display_scale,
    )
    .map_err(|e| FileError::Layout {
        detail: e.to_string(),
    })?;

    let images = fragments
        .iter()
        .zip(layouts)
        .map(|(fragment, layout)| {
            let png = encode::encode_fragment(&fragment.image).map_err(|e| FileError::Encode {
                page: fragment.page_num,
                detail: e.to_string(),
            })?;
            Ok(FragmentImage {
                page_num: fragment.page_num,
                png,
                width_px: fragment.width(),
                height_px: fragment.height(),
                layout,
            })
        })
        .collect::<Result<Vec<_>, FileError>>()?;
    drop(fragments);

    let document = docx::assemble(template, &report.identifier, &images, config).map_err(|e| {
        FileError::Assembly {
            detail: e.to_string(),
        }
    })?;

    Ok(BuiltReport {
        document,
        skipped_pages,
    })
}
