//! Ledger Store - Serialized, Atomic Append
//!
//! The ledger is one flat CSV file. Every mutation is a full
//! read-modify-write, so at most one writer may run at a time and each
//! rewrite must either land completely or leave the prior file untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::record::RegistrationRecord;

/// Fixed first row of every ledger file.
pub const LEDGER_HEADER: [&str; 6] = [
    "Name",
    "Email",
    "Phone",
    "Pass Out Year",
    "Unique ID",
    "Entered",
];

/// Wire value of the `Entered` column once a registrant has checked in.
/// The column is left blank on append.
const ENTERED_MARK: &str = "TRUE";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger row malformed: {0}")]
    Csv(#[from] csv::Error),

    #[error("ledger header mismatch, found [{0}]")]
    MalformedHeader(String),

    #[error("ledger writer lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("no ledger row with unique ID {0}")]
    UnknownId(String),

    #[error("ledger task aborted: {0}")]
    TaskFailed(String),
}

/// Append-only registration ledger backed by a single CSV file.
///
/// All mutations serialize on one async mutex; the file itself is only ever
/// replaced by an atomic rename, so readers never observe a partial write.
pub struct LedgerStore {
    path: PathBuf,
    writer: Mutex<()>,
    lock_timeout: Duration,
}

impl LedgerStore {
    pub fn new(path: PathBuf, lock_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            path,
            writer: Mutex::new(()),
            lock_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the ledger file has been initialized yet.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one record. Creates the file with the fixed header row on the
    /// first-ever append. Holds the single-writer lock for the whole
    /// read-modify-write; waits are bounded by the configured timeout.
    pub async fn append(self: &Arc<Self>, record: &RegistrationRecord) -> Result<(), LedgerError> {
        let record = record.clone();
        self.mutate(move |rows| {
            rows.push(record);
            Ok(())
        })
        .await
    }

    /// Flip the `entered` flag of one existing row. This is the only
    /// permitted post-append mutation; identifying fields stay immutable.
    pub async fn mark_entered(self: &Arc<Self>, id: &str) -> Result<(), LedgerError> {
        let id = id.to_string();
        self.mutate(move |rows| {
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(LedgerError::UnknownId(id))?;
            row.entered = true;
            Ok(())
        })
        .await
    }

    /// Read every record, in append order. Lock-free: the atomic rename in
    /// the write path guarantees readers always see a complete file.
    pub async fn all_records(self: &Arc<Self>) -> Result<Vec<RegistrationRecord>, LedgerError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(Vec::new());
            }
            read_all(&path)
        })
        .await
        .map_err(|e| LedgerError::TaskFailed(e.to_string()))?
    }

    async fn mutate<F>(self: &Arc<Self>, apply: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Vec<RegistrationRecord>) -> Result<(), LedgerError> + Send + 'static,
    {
        let guard = tokio::time::timeout(self.lock_timeout, self.writer.lock())
            .await
            .map_err(|_| LedgerError::LockTimeout(self.lock_timeout))?;

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || rewrite(&path, apply))
            .await
            .map_err(|e| LedgerError::TaskFailed(e.to_string()))?;

        drop(guard);
        result
    }
}

/// Read the full ledger, apply one mutation, and atomically replace the
/// file. On any failure the original file is left byte-identical.
fn rewrite<F>(path: &Path, apply: F) -> Result<(), LedgerError>
where
    F: FnOnce(&mut Vec<RegistrationRecord>) -> Result<(), LedgerError>,
{
    let mut rows = if path.exists() {
        read_all(path)?
    } else {
        Vec::new()
    };
    apply(&mut rows)?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    // Stage the replacement next to the ledger so the final rename cannot
    // cross filesystems.
    let mut staged = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    {
        let mut writer = csv::Writer::from_writer(staged.as_file_mut());
        writer.write_record(LEDGER_HEADER)?;
        for row in &rows {
            writer.write_record([
                row.name.as_str(),
                row.email.as_str(),
                row.phone.as_str(),
                row.passout_year.as_str(),
                row.id.as_str(),
                if row.entered { ENTERED_MARK } else { "" },
            ])?;
        }
        writer.flush()?;
    }
    staged.as_file_mut().flush()?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| LedgerError::Io(e.error))?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<RegistrationRecord>, LedgerError> {
    let mut reader = csv::Reader::from_path(path)?;
    let header = reader.headers()?.clone();
    if header.iter().ne(LEDGER_HEADER) {
        return Err(LedgerError::MalformedHeader(
            header.iter().collect::<Vec<_>>().join(", "),
        ));
    }

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        rows.push(RegistrationRecord {
            name: row.get(0).unwrap_or_default().to_string(),
            email: row.get(1).unwrap_or_default().to_string(),
            phone: row.get(2).unwrap_or_default().to_string(),
            passout_year: row.get(3).unwrap_or_default().to_string(),
            id: row.get(4).unwrap_or_default().to_string(),
            entered: !row.get(5).unwrap_or_default().is_empty(),
        });
    }
    Ok(rows)
}
