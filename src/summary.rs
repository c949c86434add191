//! Extract phase: pull the headline values of each cable report into a CSV.
//!
//! The report generator prints every value as `Label : number`. The text of
//! all pages is concatenated and each label is searched once; the first
//! match wins. A label that is absent leaves its cell empty and never fails
//! the file.

use crate::config::ConversionConfig;
use crate::error::{BatchError, FileError};
use crate::output::{write_atomic, SkippedFile, SummaryOutput};
use crate::pipeline::input::{self, SourceReport};
use crate::pipeline::render::{PdfBackend, PdfiumBackend};
use crate::progress::{percent_complete, Phase};
use crate::worker::RunControl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// CSV header, byte-compatible with the spreadsheets built on this file.
pub const CSV_HEADER: [&str; 7] = [
    "Cable",
    "Load Maximum Demand",
    "CB Rating",
    "Current Capacity",
    "MAX EF impedence",
    "EF impedence",
    "Result",
];

// ── Field patterns ───────────────────────────────────────────────────────

static RE_LOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Load Maximum Demand\s*:\s*([\d,]+(?:\.\d+)?)").unwrap());

static RE_RATING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Rating\s*:\s*([\d,]+(?:\.\d+)?)").unwrap());

static RE_RATING_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Rating \(In\)\s*:\s*([\d,]+(?:\.\d+)?)").unwrap());

/// Adjustable breakers print their trip setting; it overrides the frame rating.
static RE_TRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"Trip\s*:\s*([\d,]+(?:\.\d+)?)").unwrap());

static RE_CAPACITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Current Capacity\s*:\s*([\d,]+(?:\.\d+)?)").unwrap());

static RE_MAX_ZINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Max\. Circuit Impedance \(max\. Zint\)\s*:\s*([\d,]+(?:\.\d+)?)").unwrap()
});

static RE_ZINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Earth Fault Loop Impedance \(Zint\)\s*:\s*([\d,]+(?:\.\d+)?)").unwrap()
});

/// First capture of `re` in `text`, thousands separators removed.
fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(',', ""))
}

// ── Records ──────────────────────────────────────────────────────────────

/// Earth-fault loop check: the circuit passes when the maximum permitted
/// impedance is strictly greater than the measured one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Verdict {
    pub fn evaluate(max_impedance: Option<&str>, impedance: Option<&str>) -> Self {
        let parse = |v: Option<&str>| v.and_then(|s| s.parse::<f64>().ok());
        match (parse(max_impedance), parse(impedance)) {
            (Some(max), Some(z)) if max > z => Verdict::Pass,
            (Some(_), Some(_)) => Verdict::Fail,
            _ => Verdict::NotAvailable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "Pass",
            Verdict::Fail => "Fail",
            Verdict::NotAvailable => "N/A",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The headline values of one cable report. Numbers are kept as printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CableRecord {
    pub cable: String,
    pub load_maximum_demand: Option<String>,
    pub cb_rating: Option<String>,
    pub current_capacity: Option<String>,
    pub max_ef_impedance: Option<String>,
    pub ef_impedance: Option<String>,
    pub result: Verdict,
}

/// Parse the fields of `cable` out of its report text.
pub fn extract_fields(cable: &str, text: &str) -> CableRecord {
    let cb_rating = capture(&RE_TRIP, text)
        .or_else(|| capture(&RE_RATING, text))
        .or_else(|| capture(&RE_RATING_IN, text));
    let max_ef_impedance = capture(&RE_MAX_ZINT, text);
    let ef_impedance = capture(&RE_ZINT, text);
    let result = Verdict::evaluate(max_ef_impedance.as_deref(), ef_impedance.as_deref());

    CableRecord {
        cable: cable.to_string(),
        load_maximum_demand: capture(&RE_LOAD, text),
        cb_rating,
        current_capacity: capture(&RE_CAPACITY, text),
        max_ef_impedance,
        ef_impedance,
        result,
    }
}

/// Serialise records as CSV, header first.
pub fn to_csv(records: &[CableRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    for r in records {
        let cell = |v: &Option<String>| v.clone().unwrap_or_default();
        wtr.write_record([
            r.cable.clone(),
            cell(&r.load_maximum_demand),
            cell(&r.cb_rating),
            cell(&r.current_capacity),
            cell(&r.max_ef_impedance),
            cell(&r.ef_impedance),
            r.result.to_string(),
        ])?;
    }
    wtr.into_inner().map_err(|e| e.into_error().into())
}

// ── Phase entry points ───────────────────────────────────────────────────

/// Extract the summary of every PDF in `dir`, binding pdfium on a blocking
/// worker thread.
pub async fn extract_summary(
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<SummaryOutput, BatchError> {
    let dir = dir.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let backend = PdfiumBackend::bind(config.pdfium_library.as_deref())?;
        extract_summary_with(&backend, &dir, &config, &RunControl::new())
    })
    .await
    .map_err(|e| BatchError::Internal(format!("extraction worker failed: {e}")))?
}

/// Run the extract phase against an explicit backend on the current thread.
pub fn extract_summary_with<B: PdfBackend + ?Sized>(
    backend: &B,
    dir: &Path,
    config: &ConversionConfig,
    control: &RunControl,
) -> Result<SummaryOutput, BatchError> {
    info!("Extracting cable summary from {}", dir.display());
    let reports = input::discover_reports(dir)?;
    let total = reports.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_start(Phase::Extract, total);
    }

    let mut records = Vec::with_capacity(total);
    let mut skipped = Vec::new();
    for (i, report) in reports.iter().enumerate() {
        if control.is_stopped() {
            return Err(BatchError::Cancelled {
                completed: i,
                total,
            });
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(Phase::Extract, i + 1, total, &report.identifier);
        }

        match report_text(backend, report, config) {
            Ok(text) => {
                let record = extract_fields(&report.identifier, &text);
                debug!("'{}': {:?}", report.identifier, record);
                records.push(record);
            }
            Err(error) => {
                warn!("Skipping '{}': {}", report.identifier, error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_skipped(Phase::Extract, &report.identifier, &error.to_string());
                }
                skipped.push(SkippedFile {
                    identifier: report.identifier.clone(),
                    error,
                });
            }
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_file_complete(Phase::Extract, i + 1, total, percent_complete(i + 1, total));
        }
    }

    let output_path = dir.join(&config.summary_file_name);
    let bytes = to_csv(&records).map_err(|e| BatchError::SummaryWriteFailed {
        path: output_path.clone(),
        detail: e.to_string(),
    })?;
    write_atomic(&output_path, &bytes)?;
    info!("Wrote {} ({} rows)", output_path.display(), records.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_complete(Phase::Extract, records.len(), total);
    }
    Ok(SummaryOutput {
        output_path,
        records,
        skipped,
    })
}

/// Text of every page, concatenated. Pages whose text fails are skipped.
fn report_text<B: PdfBackend + ?Sized>(
    backend: &B,
    report: &SourceReport,
    config: &ConversionConfig,
) -> Result<String, FileError> {
    input::validate_pdf(&report.path)?;
    let pages = backend.page_count(&report.path)?;
    let mut text = String::new();
    for page_num in 1..=pages {
        match backend.page_text(&report.path, page_num) {
            Ok(t) => text.push_str(&t),
            Err(e) => {
                warn!("'{}': {}", report.identifier, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_skipped(&report.identifier, page_num, &e.to_string());
                }
            }
        }
    }
    Ok(text)
}
