//! PDF access: page rasterisation and text extraction via pdfium.
//!
//! The pipeline only ever talks to the [`PdfBackend`] trait, one page at a
//! time. [`PdfiumBackend`] re-opens the document for every page, so at most
//! one page bitmap is alive while a file is processed and a damaged page
//! costs only itself.
//!
//! pdfium keeps thread-local state; a backend is bound inside the worker
//! thread that uses it and never moves between threads.

use crate::error::{BatchError, FileError, PageError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Read-only access to report PDFs.
pub trait PdfBackend {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, FileError>;

    /// Render one page (1-based) at `dpi`.
    fn render_page(&self, path: &Path, page_num: usize, dpi: u32)
        -> Result<DynamicImage, PageError>;

    /// Plain text of one page (1-based).
    fn page_text(&self, path: &Path, page_num: usize) -> Result<String, PageError>;
}

/// [`PdfBackend`] backed by a bound pdfium library.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to pdfium at an explicit location.
    ///
    /// `library` may name the shared library itself or a directory that
    /// contains the platform library (`libpdfium.so`, `libpdfium.dylib`,
    /// `pdfium.dll`). `None` falls back to the system library search.
    pub fn bind(library: Option<&Path>) -> Result<Self, BatchError> {
        let pdfium = match library {
            Some(dir) if dir.is_dir() => {
                let file = Pdfium::pdfium_platform_library_name_at_path(dir);
                pdfium_auto::bind_pdfium_from_path(&file)
                    .map_err(|e| BatchError::PdfiumBindingFailed(e.to_string()))?
            }
            Some(file) => pdfium_auto::bind_pdfium_from_path(file)
                .map_err(|e| BatchError::PdfiumBindingFailed(e.to_string()))?,
            None => Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| BatchError::PdfiumBindingFailed(format!("{e:?}")))?,
        };
        info!("pdfium bound");
        Ok(Self { pdfium })
    }

    /// Wrap an already bound library.
    pub fn from_pdfium(pdfium: Pdfium) -> Self {
        Self { pdfium }
    }

    fn open(&self, path: &Path) -> Result<PdfDocument<'_>, String> {
        self.pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("{e:?}"))
    }
}

impl PdfBackend for PdfiumBackend {
    fn page_count(&self, path: &Path) -> Result<usize, FileError> {
        let document = self.open(path).map_err(|detail| FileError::Unreadable {
            path: path.to_path_buf(),
            detail,
        })?;
        let total = document.pages().len() as usize;
        debug!("{}: {} pages", path.display(), total);
        Ok(total)
    }

    fn render_page(
        &self,
        path: &Path,
        page_num: usize,
        dpi: u32,
    ) -> Result<DynamicImage, PageError> {
        let fail = |detail: String| PageError::RenderFailed {
            page: page_num,
            detail,
        };

        if page_num == 0 {
            return Err(fail("page numbers are 1-based".into()));
        }
        let document = self.open(path).map_err(fail)?;
        let page = document
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| fail(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| fail(format!("{e:?}")))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn page_text(&self, path: &Path, page_num: usize) -> Result<String, PageError> {
        let fail = |detail: String| PageError::TextFailed {
            page: page_num,
            detail,
        };

        if page_num == 0 {
            return Err(fail("page numbers are 1-based".into()));
        }
        let document = self.open(path).map_err(fail)?;
        let page = document
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| fail(format!("{e:?}")))?;
        let text = page.text().map_err(|e| fail(format!("{e:?}")))?;
        Ok(text.all())
    }
}
