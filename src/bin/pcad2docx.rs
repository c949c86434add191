//! CLI binary for pcad2docx.
//!
//! A thin shim over the library crate: maps CLI flags to `ConversionConfig`,
//! runs the requested phases on the background worker and renders its
//! progress events.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use pcad2docx::{
    spawn_pipeline, ConversionConfig, ConversionOutput, PdfiumBackend, Phase, PipelineHandle,
    PipelineOutcome, PipelineRequest, ProgressEvent, SummaryOutput,
};
use pdfium_auto::PdfiumLocator;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress rendering ───────────────────────────────────────────────────────

/// Renders worker events as one indicatif bar per phase plus log lines.
struct CliProgress {
    bar: ProgressBar,
    /// Print events at all. Off with `--quiet` / `--json`.
    enabled: bool,
}

impl CliProgress {
    fn new(enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        Self { bar, enabled }
    }

    fn start_phase(&mut self, phase: Phase, total_files: usize) {
        if !self.enabled {
            return;
        }
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar = ProgressBar::new(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(phase_label(phase));
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} {} PDF files…", phase_label(phase), total_files))
        ));
    }

    fn handle(&mut self, event: ProgressEvent) {
        if !self.enabled {
            return;
        }
        match event {
            ProgressEvent::PhaseStarted { phase, total_files } => {
                self.start_phase(phase, total_files);
            }
            ProgressEvent::FileStarted { identifier, .. } => {
                self.bar.set_message(identifier);
            }
            ProgressEvent::PageSkipped {
                identifier,
                page_num,
                error,
            } => {
                self.bar.println(format!(
                    "  {} {} page {:<3} {}",
                    yellow("⚠"),
                    identifier,
                    page_num,
                    dim(&truncate(&error))
                ));
            }
            ProgressEvent::FileSkipped {
                identifier, error, ..
            } => {
                self.bar.println(format!(
                    "  {} {}  {}",
                    red("✗"),
                    identifier,
                    red(&truncate(&error))
                ));
            }
            ProgressEvent::FileCompleted {
                completed, percent, ..
            } => {
                self.bar.set_position(completed as u64);
                self.bar.set_message(format!("{percent}%"));
            }
            ProgressEvent::PhaseCompleted {
                phase,
                succeeded,
                total_files,
            } => {
                self.bar.finish_and_clear();
                let failed = total_files.saturating_sub(succeeded);
                let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
                eprintln!(
                    "{} {}: {}/{} files  ({} skipped)",
                    mark,
                    phase_label(phase),
                    bold(&succeeded.to_string()),
                    total_files,
                    failed
                );
            }
            ProgressEvent::PhaseFailed { phase, error } => {
                self.bar.finish_and_clear();
                eprintln!("{} {} failed: {}", red("✘"), phase_label(phase), red(&error));
            }
        }
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Convert => "Converting",
        Phase::Extract => "Extracting",
    }
}

/// Keep very long error messages to one line.
fn truncate(msg: &str) -> String {
    if msg.chars().count() > 80 {
        let head: String = msg.chars().take(79).collect();
        format!("{head}\u{2026}")
    } else {
        msg.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Both phases: concatenated.docx and 0cable_info.csv inside reports/
  pcad2docx reports/

  # Word document only, explicit template and base document
  pcad2docx --docx --template forms/template.docx --base forms/default.docx reports/

  # CSV summary only, as JSON on stdout
  pcad2docx --csv --json reports/ > run.json

  # Use an existing pdfium and never download
  pcad2docx --pdfium-lib /opt/pdfium/lib --no-download reports/

OUTPUT (written into PDF_DIR):
  concatenated.docx   one titled section per report, in file-name order
  0cable_info.csv     Cable, Load Maximum Demand, CB Rating, Current Capacity,
                      MAX EF impedence, EF impedence, Result

SETUP:
  template.docx and default.docx are looked up next to the executable unless
  --template / --base are given.

  PDFium (~30 MB) is looked up in --pdfium-lib, next to the executable, then
  in ~/.cache/pcad2docx/pdfium-7690/. When missing it is downloaded there on
  first run, unless --no-download is set.
"#;

/// Turn cable-sizing report PDFs into one Word document and a CSV summary.
#[derive(Parser, Debug)]
#[command(
    name = "pcad2docx",
    version,
    about = "Turn cable-sizing report PDFs into one Word document and a CSV summary",
    long_about = "Renders every PDF report in a directory, trims each page down to its \
content, and stacks the pieces under a titled template section in one Word document. \
Also extracts the cable's headline values into a CSV with a pass/fail verdict.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the report PDFs.
    pdf_dir: PathBuf,

    /// Per-report template (default: template.docx next to the executable).
    #[arg(long, env = "PCAD2DOCX_TEMPLATE")]
    template: Option<PathBuf>,

    /// Base document for the composite (default: default.docx next to the executable).
    #[arg(long, env = "PCAD2DOCX_BASE")]
    base: Option<PathBuf>,

    /// Run the Word document phase.
    #[arg(long)]
    docx: bool,

    /// Run the CSV summary phase.
    #[arg(long)]
    csv: bool,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PCAD2DOCX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// pdfium library file, or a directory containing it.
    #[arg(long, env = "PCAD2DOCX_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Fail instead of downloading pdfium when it is not found.
    #[arg(long)]
    no_download: bool,

    /// Skip the remaining phases once one fails.
    #[arg(long)]
    stop_on_failure: bool,

    /// Print the run results as JSON on stdout.
    #[arg(long, env = "PCAD2DOCX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PCAD2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PCAD2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PCAD2DOCX_QUIET")]
    quiet: bool,
}

impl Cli {
    fn phases(&self) -> Vec<Phase> {
        match (self.docx, self.csv) {
            (true, false) => vec![Phase::Convert],
            (false, true) => vec![Phase::Extract],
            _ => vec![Phase::Convert, Phase::Extract],
        }
    }
}

/// Results printed by `--json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    conversion: Option<&'a ConversionOutput>,
    summary: Option<&'a SummaryOutput>,
    errors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-file feedback; library logs would
    // only tear it apart.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let exe_dir = executable_dir()?;

    // ── Ensure PDFium engine is available ───────────────────────────────────
    let library = locate_pdfium(&cli, &exe_dir)?;

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli, &exe_dir, &library)?;

    // ── Run phases ───────────────────────────────────────────────────────
    let request = PipelineRequest::new(&cli.pdf_dir, cli.phases()).stop_on_failure(cli.stop_on_failure);
    let PipelineHandle {
        mut progress,
        control,
        join,
    } = spawn_pipeline(request, config, move || PdfiumBackend::bind(Some(library.as_path())));

    // Ctrl-C stops before the next file; nothing is written for a stopped phase.
    let stopper = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let mut renderer = CliProgress::new(show_progress);
    while let Some(event) = progress.next().await {
        renderer.handle(event);
    }

    let outcome = join.await.context("Pipeline worker panicked")?;
    report(&cli, &outcome)?;

    if let Some(e) = outcome.backend_error {
        return Err(e).context("Failed to start the PDF engine");
    }
    let failures = [
        outcome.conversion.as_ref().and_then(|r| r.as_ref().err()),
        outcome.summary.as_ref().and_then(|r| r.as_ref().err()),
    ];
    let failed = failures.iter().flatten().count();
    if failed > 0 {
        anyhow::bail!("{failed} phase(s) failed");
    }
    Ok(())
}

/// Directory of the running executable; default home of the template,
/// base document and a side-by-side pdfium.
fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Cannot resolve the executable path")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Find pdfium, downloading it with a progress bar when allowed.
fn locate_pdfium(cli: &Cli, exe_dir: &Path) -> Result<PathBuf> {
    let search = cli.pdfium_lib.clone().unwrap_or_else(|| exe_dir.to_path_buf());
    let locator = PdfiumLocator::new()
        .search_path(search)
        .allow_download(!cli.no_download);

    if locator.is_available() || cli.quiet || cli.no_download {
        return tokio::task::block_in_place(|| locator.ensure(None))
            .context("PDFium library not available (use --pdfium-lib, or drop --no-download)");
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let path = tokio::task::block_in_place(|| {
        locator.ensure(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(path)
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, exe_dir: &Path, library: &Path) -> Result<ConversionConfig> {
    let template = cli
        .template
        .clone()
        .unwrap_or_else(|| exe_dir.join("template.docx"));
    let base = cli.base.clone().unwrap_or_else(|| exe_dir.join("default.docx"));

    ConversionConfig::builder()
        .dpi(cli.dpi)
        .template_path(template)
        .base_path(base)
        .pdfium_library(library)
        .build()
        .context("Invalid configuration")
}

/// Print the outcome: JSON on stdout, or a short summary on stderr.
fn report(cli: &Cli, outcome: &PipelineOutcome) -> Result<()> {
    if cli.json {
        let mut errors = Vec::new();
        if let Some(ref e) = outcome.backend_error {
            errors.push(e.to_string());
        }
        let conversion = match outcome.conversion {
            Some(Ok(ref out)) => Some(out),
            Some(Err(ref e)) => {
                errors.push(e.to_string());
                None
            }
            None => None,
        };
        let summary = match outcome.summary {
            Some(Ok(ref out)) => Some(out),
            Some(Err(ref e)) => {
                errors.push(e.to_string());
                None
            }
            None => None,
        };
        let json = serde_json::to_string_pretty(&JsonReport {
            conversion,
            summary,
            errors,
        })
        .context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    if let Some(Ok(ref out)) = outcome.conversion {
        eprintln!(
            "{}  {}/{} reports  {} pictures  {}ms  →  {}",
            if out.stats.skipped_files == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            out.stats.assembled_files,
            out.stats.total_files,
            out.stats.fragments,
            out.stats.total_duration_ms,
            bold(&out.output_path.display().to_string()),
        );
        if out.stats.failed_pages > 0 || out.stats.blank_pages > 0 {
            eprintln!(
                "   {} pages failed  /  {} blank pages",
                dim(&out.stats.failed_pages.to_string()),
                dim(&out.stats.blank_pages.to_string()),
            );
        }
    }
    if let Some(Ok(ref out)) = outcome.summary {
        eprintln!(
            "{}  {} cables  →  {}",
            if out.skipped.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            out.records.len(),
            bold(&out.output_path.display().to_string()),
        );
    }
    Ok(())
}
