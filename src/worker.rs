//! Background execution of the batch phases.
//!
//! [`spawn_pipeline`] runs the requested phases one after another on a
//! blocking worker thread, so an interactive caller stays responsive. It
//! hands back a stream of [`ProgressEvent`]s, a [`RunControl`] that stops
//! the run before the next file, and the join handle of the worker.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use pcad2docx::worker::{spawn_pipeline, PipelineRequest, ProgressEvent};
//! use pcad2docx::{ConversionConfig, PdfiumBackend, Phase};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConversionConfig::default();
//! let request = PipelineRequest::new("reports", vec![Phase::Convert, Phase::Extract]);
//! let mut handle = spawn_pipeline(request, config, || PdfiumBackend::bind(None));
//! while let Some(event) = handle.progress.next().await {
//!     if let ProgressEvent::FileCompleted { phase, percent, .. } = event {
//!         println!("{phase}: {percent}%");
//!     }
//! }
//! let outcome = handle.join.await?;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

use crate::config::ConversionConfig;
use crate::convert::convert_with;
use crate::error::BatchError;
use crate::output::{ConversionOutput, SummaryOutput};
use crate::pipeline::render::PdfBackend;
use crate::progress::{BatchProgressCallback, Phase, ProgressCallback};
use crate::summary::extract_summary_with;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

/// Stops a run between two files. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stopped: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. The file in progress still completes.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Everything the worker reports, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    PhaseStarted {
        phase: Phase,
        total_files: usize,
    },
    FileStarted {
        phase: Phase,
        index: usize,
        total_files: usize,
        identifier: String,
    },
    PageSkipped {
        identifier: String,
        page_num: usize,
        error: String,
    },
    FileSkipped {
        phase: Phase,
        identifier: String,
        error: String,
    },
    FileCompleted {
        phase: Phase,
        completed: usize,
        total_files: usize,
        percent: u8,
    },
    PhaseCompleted {
        phase: Phase,
        succeeded: usize,
        total_files: usize,
    },
    /// The phase hit a fatal error and wrote nothing.
    PhaseFailed { phase: Phase, error: String },
}

/// What to run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub dir: PathBuf,
    /// Phases in execution order.
    pub phases: Vec<Phase>,
    /// Skip the remaining phases once one fails.
    pub stop_on_failure: bool,
}

impl PipelineRequest {
    pub fn new(dir: impl Into<PathBuf>, phases: Vec<Phase>) -> Self {
        Self {
            dir: dir.into(),
            phases,
            stop_on_failure: false,
        }
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }
}

/// Result of every phase that ran. `None` means the phase was not run.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub conversion: Option<Result<ConversionOutput, BatchError>>,
    pub summary: Option<Result<SummaryOutput, BatchError>>,
    /// Set when the PDF backend could not be created; no phase ran.
    pub backend_error: Option<BatchError>,
}

impl PipelineOutcome {
    /// True when the backend came up and no phase that ran failed.
    pub fn is_success(&self) -> bool {
        self.backend_error.is_none()
            && !matches!(self.conversion, Some(Err(_)))
            && !matches!(self.summary, Some(Err(_)))
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    /// Ends when the worker finishes.
    pub progress: UnboundedReceiverStream<ProgressEvent>,
    pub control: RunControl,
    pub join: JoinHandle<PipelineOutcome>,
}

/// Start `request` on a blocking worker thread.
///
/// `make_backend` runs on the worker itself, so backends that are bound to
/// the thread that created them (pdfium) never cross threads. Any progress
/// callback already in `config` keeps receiving events alongside the
/// stream. Must be called within a tokio runtime.
pub fn spawn_pipeline<B, F>(
    request: PipelineRequest,
    mut config: ConversionConfig,
    make_backend: F,
) -> PipelineHandle
where
    B: PdfBackend + 'static,
    F: FnOnce() -> Result<B, BatchError> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let control = RunControl::new();

    let forward = ChannelCallback {
        tx: tx.clone(),
        inner: config.progress_callback.take(),
    };
    config.progress_callback = Some(Arc::new(forward));

    let worker_control = control.clone();
    let join = tokio::task::spawn_blocking(move || {
        run_phases(&request, &config, make_backend, &worker_control, &tx)
    });

    PipelineHandle {
        progress: UnboundedReceiverStream::new(rx),
        control,
        join,
    }
}

fn run_phases<B, F>(
    request: &PipelineRequest,
    config: &ConversionConfig,
    make_backend: F,
    control: &RunControl,
    tx: &UnboundedSender<ProgressEvent>,
) -> PipelineOutcome
where
    B: PdfBackend,
    F: FnOnce() -> Result<B, BatchError>,
{
    let mut outcome = PipelineOutcome::default();
    let backend = match make_backend() {
        Ok(backend) => backend,
        Err(e) => {
            error!("Cannot start pipeline: {}", e);
            for &phase in &request.phases {
                let _ = tx.send(ProgressEvent::PhaseFailed {
                    phase,
                    error: e.to_string(),
                });
            }
            outcome.backend_error = Some(e);
            return outcome;
        }
    };

    for &phase in &request.phases {
        info!("Starting {} phase", phase);
        let failure = match phase {
            Phase::Convert => {
                let result = convert_with(&backend, &request.dir, config, control);
                let failure = result.as_ref().err().map(|e| e.to_string());
                outcome.conversion = Some(result);
                failure
            }
            Phase::Extract => {
                let result = extract_summary_with(&backend, &request.dir, config, control);
                let failure = result.as_ref().err().map(|e| e.to_string());
                outcome.summary = Some(result);
                failure
            }
        };

        if let Some(error) = failure {
            error!("{} phase failed: {}", phase, error);
            let _ = tx.send(ProgressEvent::PhaseFailed { phase, error });
            if request.stop_on_failure || control.is_stopped() {
                break;
            }
        }
    }
    outcome
}

/// Turns callback invocations into stream events, forwarding to the
/// caller's own callback first.
struct ChannelCallback {
    tx: UnboundedSender<ProgressEvent>,
    inner: Option<ProgressCallback>,
}

impl ChannelCallback {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl BatchProgressCallback for ChannelCallback {
    fn on_phase_start(&self, phase: Phase, total_files: usize) {
        if let Some(ref cb) = self.inner {
            cb.on_phase_start(phase, total_files);
        }
        self.emit(ProgressEvent::PhaseStarted { phase, total_files });
    }

    fn on_file_start(&self, phase: Phase, index: usize, total_files: usize, identifier: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_file_start(phase, index, total_files, identifier);
        }
        self.emit(ProgressEvent::FileStarted {
            phase,
            index,
            total_files,
            identifier: identifier.to_string(),
        });
    }

    fn on_page_skipped(&self, identifier: &str, page_num: usize, error: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_page_skipped(identifier, page_num, error);
        }
        self.emit(ProgressEvent::PageSkipped {
            identifier: identifier.to_string(),
            page_num,
            error: error.to_string(),
        });
    }

    fn on_file_skipped(&self, phase: Phase, identifier: &str, error: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_file_skipped(phase, identifier, error);
        }
        self.emit(ProgressEvent::FileSkipped {
            phase,
            identifier: identifier.to_string(),
            error: error.to_string(),
        });
    }

    fn on_file_complete(&self, phase: Phase, completed: usize, total_files: usize, percent: u8) {
        if let Some(ref cb) = self.inner {
            cb.on_file_complete(phase, completed, total_files, percent);
        }
        self.emit(ProgressEvent::FileCompleted {
            phase,
            completed,
            total_files,
            percent,
        });
    }

    fn on_phase_complete(&self, phase: Phase, succeeded: usize, total_files: usize) {
        if let Some(ref cb) = self.inner {
            cb.on_phase_complete(phase, succeeded, total_files);
        }
        self.emit(ProgressEvent::PhaseCompleted {
            phase,
            succeeded,
            total_files,
        });
    }
}
