//! Registration Records - The Unit Of Truth
//!
//! A record is immutable once appended to the ledger, except for the
//! `entered` flag which a later check-in step flips in place.

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;

/// Raw submission fields as they arrive from the form layer.
///
/// All fields are opaque strings; the only domain rule enforced here is
/// non-emptiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub passout_year: String,
}

impl SubmissionInput {
    /// Reject submissions with any missing field before an ID is issued.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("passoutYear", &self.passout_year),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::InvalidRecord(field.to_string()));
            }
        }
        Ok(())
    }
}

/// One registration as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub passout_year: String,
    #[serde(default)]
    pub entered: bool,
}

impl RegistrationRecord {
    /// Bind a validated submission to its issued ID. `entered` starts false;
    /// only the check-in path may set it.
    pub fn new(id: String, input: SubmissionInput) -> Self {
        Self {
            id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            passout_year: input.passout_year,
            entered: false,
        }
    }
}
