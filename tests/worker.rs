//! Background worker: event stream, phase ordering and failure handling.

mod common;

use common::{report_text, setup, FakeBackend, FakePage};
use futures::StreamExt;
use pcad2docx::{spawn_pipeline, BatchError, Phase, PipelineRequest, ProgressEvent};

#[tokio::test]
async fn both_phases_stream_progress_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let backend = FakeBackend::new()
        .report(dir.path(), "F1", vec![FakePage::ink(&report_text("2", "1"))])
        .report(dir.path(), "F2", vec![FakePage::ink(&report_text("1", "2"))]);

    let request = PipelineRequest::new(dir.path(), vec![Phase::Convert, Phase::Extract]);
    let handle = spawn_pipeline(request, config, move || Ok(backend));
    let events: Vec<ProgressEvent> = handle.progress.collect().await;
    let outcome = handle.join.await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.conversion.unwrap().unwrap().stats.assembled_files, 2);
    assert_eq!(outcome.summary.unwrap().unwrap().records.len(), 2);

    assert_eq!(
        events.first(),
        Some(&ProgressEvent::PhaseStarted {
            phase: Phase::Convert,
            total_files: 2
        })
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::PhaseCompleted {
            phase: Phase::Extract,
            succeeded: 2,
            total_files: 2
        })
    );
    let percents: Vec<(Phase, u8)> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::FileCompleted { phase, percent, .. } => Some((*phase, *percent)),
            _ => None,
        })
        .collect();
    assert_eq!(
        percents,
        vec![
            (Phase::Convert, 50),
            (Phase::Convert, 100),
            (Phase::Extract, 50),
            (Phase::Extract, 100)
        ]
    );
    let started: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::FileStarted { identifier, .. } => Some(identifier.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["F1", "F2", "F1", "F2"]);
}

#[tokio::test]
async fn failed_phase_does_not_stop_the_next_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.template_path = dir.path().join("missing.docx");
    let backend = FakeBackend::new().report(dir.path(), "F1", vec![FakePage::ink("")]);

    let request = PipelineRequest::new(dir.path(), vec![Phase::Convert, Phase::Extract]);
    let handle = spawn_pipeline(request, config, move || Ok(backend));
    let events: Vec<ProgressEvent> = handle.progress.collect().await;
    let outcome = handle.join.await.unwrap();

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.conversion,
        Some(Err(BatchError::TemplateMissing { .. }))
    ));
    assert!(matches!(outcome.summary, Some(Ok(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::PhaseFailed { phase: Phase::Convert, .. })));
    assert!(dir.path().join("0cable_info.csv").exists());
    assert!(!dir.path().join("concatenated.docx").exists());
}

#[tokio::test]
async fn stop_on_failure_skips_remaining_phases() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.base_path = dir.path().join("missing.docx");
    let backend = FakeBackend::new().report(dir.path(), "F1", vec![FakePage::ink("")]);

    let request = PipelineRequest::new(dir.path(), vec![Phase::Convert, Phase::Extract])
        .stop_on_failure(true);
    let handle = spawn_pipeline(request, config, move || Ok(backend));
    let events: Vec<ProgressEvent> = handle.progress.collect().await;
    let outcome = handle.join.await.unwrap();

    assert!(matches!(
        outcome.conversion,
        Some(Err(BatchError::BaseDocumentMissing { .. }))
    ));
    assert!(outcome.summary.is_none());
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::PhaseStarted { phase: Phase::Extract, .. })));
}

#[tokio::test]
async fn backend_failure_fails_every_requested_phase() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let request = PipelineRequest::new(dir.path(), vec![Phase::Extract, Phase::Convert]);
    let handle = spawn_pipeline(request, config, || -> Result<FakeBackend, BatchError> {
        Err(BatchError::PdfiumBindingFailed("no library".into()))
    });
    let events: Vec<ProgressEvent> = handle.progress.collect().await;
    let outcome = handle.join.await.unwrap();

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.backend_error,
        Some(BatchError::PdfiumBindingFailed(_))
    ));
    assert!(outcome.conversion.is_none() && outcome.summary.is_none());
    let failed: Vec<Phase> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![Phase::Extract, Phase::Convert]);
}
