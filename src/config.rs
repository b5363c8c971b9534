//! Pipeline Configuration
//!
//! One JSON file describes the operational assets (ledger, template, font,
//! artifact directory), render geometry, the ledger lock timeout, and an
//! optional SMTP relay.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::compositor::{ImageCompositor, RenderGeometry};
use crate::ledger::LedgerStore;
use crate::notify::{LogMailer, MailTransport, NotificationDispatcher, SmtpConfig, SmtpMailer};
use crate::pipeline::RegistrationPipeline;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not readable: {0}")]
    Io(#[from] std::io::Error),

    #[error("config not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
    #[serde(default = "default_font_path")]
    pub font_path: PathBuf,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub geometry: RenderGeometry,
    /// Absent means log-only delivery.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("static/registrations.csv")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("static/template.png")
}

fn default_font_path() -> PathBuf {
    PathBuf::from("static/credential.ttf")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            template_path: default_template_path(),
            font_path: default_font_path(),
            artifact_dir: default_artifact_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            geometry: RenderGeometry::default(),
            smtp: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. A missing file yields the defaults so the
    /// pipeline can run out of the box.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Assemble the full pipeline this configuration describes.
    pub fn build_pipeline(&self) -> Arc<RegistrationPipeline> {
        let renderer = Arc::new(ImageCompositor::new(
            self.template_path.clone(),
            self.font_path.clone(),
            self.geometry.clone(),
        ));
        let ledger = LedgerStore::new(self.ledger_path.clone(), self.lock_timeout());

        let (transport, from): (Arc<dyn MailTransport>, String) = match &self.smtp {
            Some(smtp) => (Arc::new(SmtpMailer::new(smtp.clone())), smtp.from_header()),
            None => (Arc::new(LogMailer), "GatePass <noreply@localhost>".to_string()),
        };
        let dispatcher = NotificationDispatcher::new(transport, from);

        RegistrationPipeline::new(renderer, ledger, dispatcher, self.artifact_dir.clone())
    }
}
