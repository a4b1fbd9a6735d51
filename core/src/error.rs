//! Error types for the conversion session.

use crate::session::SessionState;
use thiserror::Error;

/// Errors returned by `ConversionSession` operations.
///
/// Navigation misses are not errors; those operations return `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not legal in the current state; nothing changed.
    #[error("{operation} is not allowed in {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The converter call failed. Conversion-starting operations have reset
    /// the session; boundary and focus operations left it unchanged.
    #[error("converter failed during {operation}")]
    ConverterFailed { operation: &'static str },

    /// The converter succeeded but produced nothing to show.
    #[error("converter returned no candidates")]
    NoCandidates,

    /// A caller-provided candidate id is not in the focused segment.
    #[error("candidate {0} is not in the focused segment")]
    CandidateNotFound(i32),

    /// A caller-provided index is outside the candidate list.
    #[error("index {index} is out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Internal bookkeeping disagrees with the segments; the operation aborted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
