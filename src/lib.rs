//! GatePass Core - Event Registration Credential Compiler
//!
//! # The Guarantees (Non-Negotiable)
//! 1. IDs Never Collide
//! 2. Payload Encoding Is Deterministic
//! 3. Ledger Appends Are Serialized And Atomic
//! 4. No Ledger Row Without A Credential
//! 5. No Email Without A Ledger Row
//! 6. The Ledger, Not The Mailbox, Is The Source Of Truth

pub mod compositor;
pub mod config;
pub mod hashing;
pub mod ids;
pub mod ledger;
pub mod notify;
pub mod payload;
pub mod pipeline;
pub mod record;

pub use compositor::{CredentialArtifact, CredentialRenderer, ImageCompositor, RenderGeometry};
pub use config::{ConfigError, PipelineConfig};
pub use hashing::sha256_hex;
pub use ids::IdIssuer;
pub use ledger::{LedgerError, LedgerStore, LEDGER_HEADER};
pub use notify::{LogMailer, MailTransport, NotificationDispatcher, SmtpConfig, SmtpMailer};
pub use pipeline::{PipelineError, RegistrationPipeline, Stage};
pub use record::{RegistrationRecord, SubmissionInput};
