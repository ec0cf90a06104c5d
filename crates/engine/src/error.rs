//! Error taxonomy of the projection engine.
//!
//! Three classes, with distinct blast radii:
//!
//! - [`ProjectionError::Validation`] — a malformed key/value or an
//!   invalid field update. Dropped per-field (or rejected per-update),
//!   logged; the rest of the batch proceeds.
//! - [`ProjectionError::LedgerGap`] — a missing contiguous epoch.
//!   Fatal for the single program's pending commit or computation;
//!   other programs and subsequent blocks are unaffected.
//! - [`ProjectionError::NotFound`] — a referenced program or account is
//!   absent. Surfaced to the caller of a read operation, never retried.
//!
//! Arithmetic edge cases (zero total staked) are defined as explicit
//! zero contributions and never raised as errors.

use stakewatch_common::DecodeError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// Malformed key/value, non-positive deposit, out-of-range
    /// starting epoch.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The epoch ledger is missing an index required to be contiguous.
    #[error("epoch ledger gap: program {program_id} missing epoch {epoch_index}")]
    LedgerGap {
        program_id: String,
        epoch_index: u64,
    },

    /// A referenced program or account does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<DecodeError> for ProjectionError {
    fn from(e: DecodeError) -> Self {
        ProjectionError::Validation(e.to_string())
    }
}
