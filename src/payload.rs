//! Credential Encoder - Deterministic Scannable Payloads
//!
//! The same record must always encode to the same payload so a credential
//! can be re-rendered idempotently.

use crate::pipeline::PipelineError;
use crate::record::RegistrationRecord;

/// Serialize the identifying fields of a record into the string embedded in
/// the scannable code.
///
/// Fails with [`PipelineError::InvalidRecord`] if any required field is
/// empty; a credential with missing fields scans as garbage at the door.
pub fn encode(record: &RegistrationRecord) -> Result<String, PipelineError> {
    for (field, value) in [
        ("id", &record.id),
        ("name", &record.name),
        ("email", &record.email),
        ("phone", &record.phone),
        ("passoutYear", &record.passout_year),
    ] {
        if value.trim().is_empty() {
            return Err(PipelineError::InvalidRecord(field.to_string()));
        }
    }

    Ok(format!(
        "ID: {}, Name: {}, Email: {}, Phone: {}, Year of Pass Out: {}",
        record.id, record.name, record.email, record.phone, record.passout_year
    ))
}
