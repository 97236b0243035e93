//! Participant error types.

use common::TxnPartId;
use rpc::RpcError;
use thiserror::Error;

use crate::state::TxnPartState;

/// A wiring defect the participant cannot recover from.
///
/// Violations are reported to the [`Supervisor`](crate::Supervisor), which
/// is expected to terminate the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A part named a caller that was never registered.
    #[error("Invalid call: no caller registered as '{call_name}' (part {part_id})")]
    UnregisteredCaller {
        part_id: TxnPartId,
        call_name: String,
    },

    /// A part had to be rolled back but its caller supplied no rollbacker.
    #[error("No rollbacker for '{call_name}' (part {part_id})")]
    MissingRollbacker {
        part_id: TxnPartId,
        call_name: String,
    },
}

/// Errors that can occur during participant operations.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// Fatal protocol violation.
    #[error("Protocol violation: {0}")]
    Fatal(#[from] ProtocolViolation),

    /// The coordinator asked for a transition the part cannot make.
    #[error("Illegal transition for part {part_id}: {from} -> {to}")]
    IllegalTransition {
        part_id: TxnPartId,
        from: TxnPartState,
        to: TxnPartState,
    },

    /// A caller with this name already exists.
    #[error("Caller already registered: {0}")]
    DuplicateCaller(String),

    /// A bounded retry policy gave up on a coordinator notification.
    #[error("{method} not acknowledged after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        method: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// Transport error.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ParticipantError {
    /// Returns true if the error must bring the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParticipantError::Fatal(_))
    }
}

/// Convenience type alias for participant results.
pub type Result<T> = std::result::Result<T, ParticipantError>;
