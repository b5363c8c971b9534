//! Identifier Issuer - Coordination-Free Uniqueness
//!
//! 128 random bits per registration. The space is large enough that no
//! cross-request locking is needed for uniqueness.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::pipeline::PipelineError;

/// Issues globally unique registration IDs from the OS entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdIssuer;

impl IdIssuer {
    /// Draw a fresh v4 UUID.
    ///
    /// The only failure mode is the OS RNG itself being unavailable, which
    /// surfaces as [`PipelineError::EntropyUnavailable`].
    pub fn issue(&self) -> Result<String, PipelineError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| PipelineError::EntropyUnavailable(e.to_string()))?;
        Ok(uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string())
    }
}
