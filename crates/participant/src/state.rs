//! Transaction part state machine.

use serde::{Deserialize, Serialize};

/// The state of a transaction part in its lifecycle.
///
/// State transitions:
/// ```text
/// Working ──┬──► Prepared ──┬──► Committed
///           │               └──► Aborted
///           └──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxnPartState {
    /// The caller is executing.
    #[default]
    Working,

    /// The caller succeeded and the vote is (being) reported.
    Prepared,

    /// The coordinator committed the part (terminal state).
    Committed,

    /// The caller failed or the coordinator aborted (terminal state).
    Aborted,
}

impl TxnPartState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: TxnPartState) -> bool {
        matches!(
            (self, next),
            (TxnPartState::Working, TxnPartState::Prepared)
                | (TxnPartState::Working, TxnPartState::Aborted)
                | (TxnPartState::Prepared, TxnPartState::Committed)
                | (TxnPartState::Prepared, TxnPartState::Aborted)
        )
    }

    pub fn can_commit(&self) -> bool {
        self.can_transition_to(TxnPartState::Committed)
    }

    pub fn can_abort(&self) -> bool {
        self.can_transition_to(TxnPartState::Aborted)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnPartState::Committed | TxnPartState::Aborted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnPartState::Working => "Working",
            TxnPartState::Prepared => "Prepared",
            TxnPartState::Committed => "Committed",
            TxnPartState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for TxnPartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
