//! Pipeline stages for report-to-document conversion.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested without the others and the PDF backend can be swapped for a
//! fake in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ trim ──▶ layout ──▶ encode ──▶ docx::assemble
//! (dir)     (pdfium)   (crop)   (EMU)      (PNG)      (template)
//! ```
//!
//! 1. [`input`]  — list and validate the PDFs of one directory, sorted
//! 2. [`render`] — rasterise one page at a time; pdfium is not async-safe
//! 3. [`trim`]   — strip the report frame and the blank tail of each page
//! 4. [`layout`] — share the per-report height budget between fragments
//! 5. [`encode`] — PNG-encode each fragment for the Word package

pub mod encode;
pub mod input;
pub mod layout;
pub mod render;
pub mod trim;
