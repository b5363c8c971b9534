//! Registration Pipeline - Single Entry Point
//!
//! CRITICAL: every submission runs the same strict stage order:
//! issue ID -> encode payload -> render -> append to ledger -> notify.
//! Nothing is written to the ledger for a submission whose credential could
//! not be rendered, and no email is sent for an unrecorded registration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;

use crate::compositor::CredentialRenderer;
use crate::ids::IdIssuer;
use crate::ledger::{LedgerError, LedgerStore};
use crate::notify::NotificationDispatcher;
use crate::payload;
use crate::record::{RegistrationRecord, SubmissionInput};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid record: missing field {0}")]
    InvalidRecord(String),

    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Font not found: {}", .0.display())]
    FontNotFound(PathBuf),

    #[error("Credential encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] LedgerError),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),
}

/// Per-submission state machine. Terminal states are `Notified` and a
/// failure at whichever stage an error escaped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Encoded,
    Rendered,
    Recorded,
    Notified,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Encoded => "encoded",
            Stage::Rendered => "rendered",
            Stage::Recorded => "recorded",
            Stage::Notified => "notified",
        }
    }
}

impl PipelineError {
    /// The last stage a submission reached before this error escaped.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidRecord(_) | PipelineError::EntropyUnavailable(_) => {
                Stage::Received
            }
            PipelineError::TemplateNotFound(_)
            | PipelineError::FontNotFound(_)
            | PipelineError::EncodingFailed(_) => Stage::Encoded,
            PipelineError::PersistenceFailed(_) => Stage::Rendered,
            PipelineError::NotificationFailed(_) => Stage::Recorded,
        }
    }
}

/// The registration pipeline - single entry point for all submissions.
pub struct RegistrationPipeline {
    issuer: IdIssuer,
    renderer: Arc<dyn CredentialRenderer>,
    ledger: Arc<LedgerStore>,
    dispatcher: Arc<NotificationDispatcher>,
    artifact_dir: PathBuf,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl RegistrationPipeline {
    pub fn new(
        renderer: Arc<dyn CredentialRenderer>,
        ledger: Arc<LedgerStore>,
        dispatcher: Arc<NotificationDispatcher>,
        artifact_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            issuer: IdIssuer,
            renderer,
            ledger,
            dispatcher,
            artifact_dir,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    /// Wait until every detached notification task has resolved. Callers
    /// that are about to exit (the CLI, tests) use this so dispatch attempts
    /// are not cut short; the submission path never waits on it.
    pub async fn drain_notifications(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Process one submission end to end.
    ///
    /// Returns once the registration is durable in the ledger. Notification
    /// runs as a detached task: a recorded registration is reported as a
    /// success regardless of email outcome, and delivery failures surface
    /// only in the operator log.
    pub async fn process_submission(
        self: &Arc<Self>,
        input: SubmissionInput,
    ) -> Result<RegistrationRecord, PipelineError> {
        input.validate()?;

        let id = self.issuer.issue()?;
        let record = RegistrationRecord::new(id, input);
        tracing::debug!(id = %record.id, stage = Stage::Received.as_str(), "submission accepted");

        let encoded = payload::encode(&record)?;
        tracing::debug!(id = %record.id, stage = Stage::Encoded.as_str(), "payload encoded");

        // Rendering is CPU bound; keep it off the async workers.
        let renderer = Arc::clone(&self.renderer);
        let render_record = record.clone();
        let artifact =
            tokio::task::spawn_blocking(move || renderer.render(&render_record, &encoded))
                .await
                .map_err(|e| PipelineError::EncodingFailed(format!("render task: {e}")))??;

        let artifact_path = self.artifact_dir.join(artifact.filename());
        tracing::debug!(
            id = %record.id,
            stage = Stage::Rendered.as_str(),
            hash = %artifact.hash,
            "credential rendered"
        );

        self.stage_artifact(&artifact_path, &artifact.png)
            .await
            .map_err(|e| PipelineError::EncodingFailed(format!("artifact staging: {e}")))?;

        if let Err(e) = self.ledger.append(&record).await {
            // The registration was never recorded; drop the orphan artifact.
            let _ = tokio::fs::remove_file(&artifact_path).await;
            return Err(PipelineError::PersistenceFailed(e));
        }
        tracing::info!(id = %record.id, stage = Stage::Recorded.as_str(), "registration recorded");

        // Fire and forget: the caller's response must not wait on the mail
        // server, and a failure here does not undo the ledger row.
        let dispatcher = Arc::clone(&self.dispatcher);
        let notify_record = record.clone();
        let pipeline = Arc::clone(self);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            match dispatcher.notify(&notify_record, &artifact_path).await {
                Ok(()) => {
                    tracing::info!(
                        id = %notify_record.id,
                        stage = Stage::Notified.as_str(),
                        "credential dispatched"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        id = %notify_record.id,
                        email = %notify_record.email,
                        error = %e,
                        "credential delivery failed; registration remains recorded"
                    );
                }
            }
            pipeline.in_flight.fetch_sub(1, Ordering::SeqCst);
            pipeline.idle.notify_waiters();
        });

        Ok(record)
    }

    async fn stage_artifact(&self, path: &std::path::Path, png: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        let staged = tokio::fs::write(path, png).await;
        if staged.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        staged
    }
}
