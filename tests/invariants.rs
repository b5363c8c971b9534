//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees of the registration
//! pipeline: distinct IDs, no lost ledger updates, atomic rewrites, and the
//! ledger-over-mailbox failure policy.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatepass_core::{
    sha256_hex, CredentialArtifact, CredentialRenderer, ImageCompositor, LedgerStore, MailTransport,
    NotificationDispatcher, PipelineError, RegistrationPipeline, RegistrationRecord, RenderGeometry,
    SubmissionInput,
};

/// Minimal 1x1 transparent PNG; orchestration tests do not need a real
/// template render.
const TINY_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

struct StubRenderer;

impl CredentialRenderer for StubRenderer {
    fn render(
        &self,
        record: &RegistrationRecord,
        _payload: &str,
    ) -> Result<CredentialArtifact, PipelineError> {
        Ok(CredentialArtifact {
            id: record.id.clone(),
            png: TINY_PNG.to_vec(),
            hash: sha256_hex(&TINY_PNG),
        })
    }
}

struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingTransport {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail,
        })
    }
}

impl MailTransport for RecordingTransport {
    fn deliver(
        &self,
        message: &lettre::Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("relay rejected the message".into());
        }
        let to = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.sent.lock().unwrap().push(to);
        Ok(())
    }
}

fn submission() -> SubmissionInput {
    SubmissionInput {
        name: "Ann".to_string(),
        email: "ann@x.com".to_string(),
        phone: "555".to_string(),
        passout_year: "2020".to_string(),
    }
}

fn create_pipeline(dir: &Path, transport: Arc<RecordingTransport>) -> Arc<RegistrationPipeline> {
    let ledger = LedgerStore::new(dir.join("ledger.csv"), Duration::from_secs(5));
    let dispatcher =
        NotificationDispatcher::new(transport, "Registrations <events@example.com>".to_string());
    RegistrationPipeline::new(
        Arc::new(StubRenderer),
        ledger,
        dispatcher,
        dir.join("artifacts"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invariant_concurrent_submissions_distinct_ids_no_lost_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = create_pipeline(dir.path(), RecordingTransport::new(false));

    let mut handles = Vec::new();
    for i in 0..16 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let mut input = submission();
            input.name = format!("Registrant {i}");
            pipeline.process_submission(input).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16, "IDs must never collide");

    let rows = pipeline.ledger().all_records().await.unwrap();
    assert_eq!(rows.len(), 16, "no append may be lost under concurrency");
    pipeline.drain_notifications().await;
}

#[tokio::test]
async fn invariant_first_submission_initializes_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = create_pipeline(dir.path(), RecordingTransport::new(false));
    assert!(!pipeline.ledger().exists());

    pipeline.process_submission(submission()).await.unwrap();
    pipeline.drain_notifications().await;

    let contents = fs::read_to_string(dir.path().join("ledger.csv")).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines[0], "Name,Email,Phone,Pass Out Year,Unique ID,Entered");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("Ann,ann@x.com,555,2020,"));
}

#[tokio::test]
async fn invariant_failed_append_leaves_ledger_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.csv");
    fs::write(&ledger_path, "Some,Other,Header\nstray,row,here\n").unwrap();
    let before = fs::read(&ledger_path).unwrap();

    let pipeline = create_pipeline(dir.path(), RecordingTransport::new(false));
    let err = pipeline.process_submission(submission()).await.unwrap_err();
    assert!(matches!(err, PipelineError::PersistenceFailed(_)));
    assert_eq!(
        fs::read(&ledger_path).unwrap(),
        before,
        "a failed append must not disturb the prior ledger"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn invariant_unwritable_ledger_dir_fails_without_corruption() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let ledger_dir = dir.path().join("ledger");
    fs::create_dir(&ledger_dir).unwrap();
    let ledger_path = ledger_dir.join("ledger.csv");

    let ledger = LedgerStore::new(ledger_path.clone(), Duration::from_secs(5));
    let dispatcher = NotificationDispatcher::new(
        RecordingTransport::new(false),
        "Registrations <events@example.com>".to_string(),
    );
    let pipeline = RegistrationPipeline::new(
        Arc::new(StubRenderer),
        ledger,
        dispatcher,
        dir.path().join("artifacts"),
    );

    pipeline.process_submission(submission()).await.unwrap();
    pipeline.drain_notifications().await;
    let before = fs::read(&ledger_path).unwrap();

    // Staging the temp file needs a writable directory; take that away.
    fs::set_permissions(&ledger_dir, fs::Permissions::from_mode(0o555)).unwrap();

    // Root bypasses permission bits; nothing to observe in that case.
    if fs::write(ledger_dir.join("writable-check"), b"x").is_ok() {
        fs::set_permissions(&ledger_dir, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let err = pipeline.process_submission(submission()).await.unwrap_err();
    assert!(matches!(err, PipelineError::PersistenceFailed(_)));
    assert_eq!(fs::read(&ledger_path).unwrap(), before);

    fs::set_permissions(&ledger_dir, fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn invariant_render_failure_adds_no_ledger_row() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = LedgerStore::new(dir.path().join("ledger.csv"), Duration::from_secs(5));
    let dispatcher = NotificationDispatcher::new(
        RecordingTransport::new(false),
        "Registrations <events@example.com>".to_string(),
    );
    // Real compositor pointed at a template that does not exist.
    let renderer = Arc::new(ImageCompositor::new(
        dir.path().join("missing-template.png"),
        dir.path().join("missing-font.ttf"),
        RenderGeometry::default(),
    ));
    let pipeline =
        RegistrationPipeline::new(renderer, ledger, dispatcher, dir.path().join("artifacts"));

    let err = pipeline.process_submission(submission()).await.unwrap_err();
    assert!(matches!(err, PipelineError::TemplateNotFound(_)));
    assert!(
        !pipeline.ledger().exists(),
        "no orphan records without credentials"
    );
}

#[tokio::test]
async fn invariant_invalid_input_rejected_before_any_side_effect() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new(false);
    let pipeline = create_pipeline(dir.path(), transport.clone());

    let mut input = submission();
    input.email = String::new();
    let err = pipeline.process_submission(input).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRecord(_)));
    assert!(!pipeline.ledger().exists());
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invariant_notification_failure_still_reports_success() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new(true);
    let pipeline = create_pipeline(dir.path(), transport.clone());

    let record = pipeline.process_submission(submission()).await.unwrap();
    pipeline.drain_notifications().await;

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    let rows = pipeline.ledger().all_records().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, record.id);

    // The transient artifact is removed even on a failed send.
    let artifact = dir
        .path()
        .join("artifacts")
        .join(format!("composite_{}.png", record.id));
    assert!(!artifact.exists());
}

#[tokio::test]
async fn invariant_successful_dispatch_sends_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new(false);
    let pipeline = create_pipeline(dir.path(), transport.clone());

    let record = pipeline.process_submission(submission()).await.unwrap();
    pipeline.drain_notifications().await;

    assert_eq!(transport.sent.lock().unwrap().as_slice(), ["ann@x.com"]);
    let artifact = dir
        .path()
        .join("artifacts")
        .join(format!("composite_{}.png", record.id));
    assert!(!artifact.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invariant_duplicate_email_yields_two_rows_with_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = create_pipeline(dir.path(), RecordingTransport::new(false));

    let a = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.process_submission(submission()).await })
    };
    let b = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.process_submission(submission()).await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert_ne!(a.id, b.id);
    pipeline.drain_notifications().await;

    let rows = pipeline.ledger().all_records().await.unwrap();
    let anns: Vec<_> = rows.iter().filter(|r| r.email == "ann@x.com").collect();
    assert_eq!(anns.len(), 2);

    let contents = fs::read_to_string(dir.path().join("ledger.csv")).unwrap();
    assert!(contents.starts_with("Name,Email,Phone,Pass Out Year,Unique ID,Entered\n"));
}

#[tokio::test]
async fn invariant_check_in_flips_only_the_named_row() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = create_pipeline(dir.path(), RecordingTransport::new(false));

    let first = pipeline.process_submission(submission()).await.unwrap();
    let second = pipeline.process_submission(submission()).await.unwrap();
    pipeline.drain_notifications().await;

    pipeline.ledger().mark_entered(&second.id).await.unwrap();

    let rows = pipeline.ledger().all_records().await.unwrap();
    let entered: Vec<_> = rows.iter().filter(|r| r.entered).collect();
    assert_eq!(entered.len(), 1);
    assert_eq!(entered[0].id, second.id);
    assert!(rows.iter().any(|r| r.id == first.id && !r.entered));

    let err = pipeline
        .ledger()
        .mark_entered("no-such-id")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no-such-id"));
}
