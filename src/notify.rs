//! Notification Dispatcher - Credential Delivery
//!
//! Builds the registration email with the rendered credential attached
//! inline and hands it to a mail transport. The ledger, not the mailbox, is
//! the source of truth: delivery failures are logged, never escalated, and
//! the transient artifact is removed once the send attempt resolves.

use std::path::Path;
use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;

use crate::pipeline::PipelineError;
use crate::record::RegistrationRecord;

/// Content-ID the HTML body uses to reference the inline credential image.
const CREDENTIAL_CID: &str = "credential";

/// SMTP relay settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

/// Delivery seam. Production hands messages to SMTP; tests record them.
pub trait MailTransport: Send + Sync {
    fn deliver(&self, message: &Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sends via an SMTP relay with credentials.
///
/// A fresh transport is built per delivery to avoid connection pooling
/// issues across long idle stretches between registrations.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> Result<SmtpTransport, Box<dyn std::error::Error + Send + Sync>> {
        Ok(SmtpTransport::relay(&self.config.server)?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build())
    }
}

impl MailTransport for SmtpMailer {
    fn deliver(&self, message: &Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let transport = self.build_transport()?;
        transport.send(message)?;
        Ok(())
    }
}

/// Drops messages on the floor with a log line. Used when no SMTP relay is
/// configured, so the pipeline stays operable without mail credentials.
pub struct LogMailer;

impl MailTransport for LogMailer {
    fn deliver(&self, message: &Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            envelope = ?message.envelope(),
            "no SMTP relay configured, credential email not sent"
        );
        Ok(())
    }
}

/// Builds and dispatches the registration email, then cleans up the
/// transient artifact file.
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    from: String,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, from: String) -> Arc<Self> {
        Arc::new(Self { transport, from })
    }

    /// Send the credential to the record's address. The artifact file is
    /// deleted whether or not delivery succeeds; a registration already in
    /// the ledger is authoritative regardless of email outcome.
    pub async fn notify(
        &self,
        record: &RegistrationRecord,
        artifact_path: &Path,
    ) -> Result<(), PipelineError> {
        let outcome = self.send(record, artifact_path).await;

        if let Err(e) = tokio::fs::remove_file(artifact_path).await {
            tracing::warn!(
                path = %artifact_path.display(),
                error = %e,
                "could not remove transient credential artifact"
            );
        }

        outcome
    }

    async fn send(
        &self,
        record: &RegistrationRecord,
        artifact_path: &Path,
    ) -> Result<(), PipelineError> {
        let png = tokio::fs::read(artifact_path)
            .await
            .map_err(|e| PipelineError::NotificationFailed(format!("artifact read: {e}")))?;
        let message = self.build_message(record, png)?;

        let transport = Arc::clone(&self.transport);
        tokio::task::spawn_blocking(move || transport.deliver(&message))
            .await
            .map_err(|e| PipelineError::NotificationFailed(format!("delivery task: {e}")))?
            .map_err(|e| PipelineError::NotificationFailed(e.to_string()))
    }

    fn build_message(
        &self,
        record: &RegistrationRecord,
        png: Vec<u8>,
    ) -> Result<Message, PipelineError> {
        let html = format!(
            r#"<html>
  <body>
    <p>Hello {name},</p>
    <p>Thank you for submitting your information. We have received your details:</p>
    <ul>
      <li>Name: {name}</li>
      <li>Email: {email}</li>
      <li>Phone Number: {phone}</li>
      <li>Year of Pass Out: {year}</li>
      <li>Unique ID: {id}</li>
    </ul>
    <p>Attached is your unique QR code image.</p>
    <p><img src="cid:{cid}" alt="Your event credential"/></p>
    <p>Best regards,<br>Your Company</p>
  </body>
</html>"#,
            name = record.name,
            email = record.email,
            phone = record.phone,
            year = record.passout_year,
            id = record.id,
            cid = CREDENTIAL_CID,
        );

        let png_type = ContentType::parse("image/png")
            .map_err(|e| PipelineError::NotificationFailed(format!("content type: {e}")))?;
        let inline = Attachment::new_inline(CREDENTIAL_CID.to_string()).body(Body::new(png), png_type);

        Message::builder()
            .from(self.from.parse().map_err(|e| {
                PipelineError::NotificationFailed(format!("invalid from address: {e}"))
            })?)
            .to(record.email.parse().map_err(|e| {
                PipelineError::NotificationFailed(format!("invalid to address: {e}"))
            })?)
            .subject("Your Event QR Code")
            .multipart(
                MultiPart::related()
                    .singlepart(SinglePart::html(html))
                    .singlepart(inline),
            )
            .map_err(|e| PipelineError::NotificationFailed(format!("message build: {e}")))
    }
}
