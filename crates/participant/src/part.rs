//! A transaction part and its guarded transitions.

use std::sync::Mutex;

use common::{ErrorCode, ShardIndex, TxnId, TxnPartId, TxnPartRequest};
use serde_json::Value;
use tokio::sync::watch;

use crate::caller::{CallOutcome, Rollbacker};
use crate::error::{ParticipantError, ProtocolViolation, Result};
use crate::state::TxnPartState;

/// How the caller's result landed on the part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The caller succeeded; the part is now `Prepared`.
    Prepared,
    /// The caller failed with the given code; the part is now `Aborted`.
    Failed(ErrorCode),
    /// The coordinator aborted the part while the caller was running. The
    /// caller's own code is still reported.
    Preempted(ErrorCode),
}

struct PartInner {
    state: TxnPartState,
    /// Set once the caller has returned.
    err_code: Option<ErrorCode>,
    rollbacker: Option<Box<dyn Rollbacker>>,
    rolled_back: bool,
}

/// One shard's unit of work.
///
/// Every transition goes through the methods below, which hold the part's
/// lock only for the state change itself, never across the caller or the
/// rollbacker. The rollback guard ensures [`TxnPart::rollback_once`] runs
/// the rollbacker at most once, whichever of the local failure path and
/// an inbound abort gets there first.
pub struct TxnPart {
    request: TxnPartRequest,
    inner: Mutex<PartInner>,
    state_tx: watch::Sender<TxnPartState>,
}

impl TxnPart {
    pub fn new(request: TxnPartRequest) -> Self {
        let (state_tx, _) = watch::channel(TxnPartState::Working);
        Self {
            request,
            inner: Mutex::new(PartInner {
                state: TxnPartState::Working,
                err_code: None,
                rollbacker: None,
                rolled_back: false,
            }),
            state_tx,
        }
    }

    pub fn id(&self) -> &TxnPartId {
        &self.request.id
    }

    pub fn txn_id(&self) -> &TxnId {
        &self.request.txn_id
    }

    pub fn shard_index(&self) -> ShardIndex {
        self.request.shard_index
    }

    pub fn call_name(&self) -> &str {
        &self.request.call_name
    }

    pub fn input(&self) -> &Value {
        &self.request.input
    }

    pub fn state(&self) -> TxnPartState {
        self.lock().state
    }

    /// The caller's error code, once it has returned.
    pub fn err_code(&self) -> Option<ErrorCode> {
        self.lock().err_code
    }

    /// Returns true once the rollbacker has been claimed.
    pub fn is_rolled_back(&self) -> bool {
        self.lock().rolled_back
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<TxnPartState> {
        self.state_tx.subscribe()
    }

    /// Records the caller's outcome.
    ///
    /// A working part moves to `Prepared` or `Aborted` depending on the
    /// error code. A part the coordinator already aborted keeps its state;
    /// the outcome's rollbacker is stored so the abort can still be undone.
    pub fn complete(&self, outcome: CallOutcome) -> Completion {
        let mut inner = self.lock();
        inner.err_code = Some(outcome.err_code);
        inner.rollbacker = outcome.rollbacker;

        let current = inner.state;
        match current {
            TxnPartState::Working if outcome.err_code.is_ok() => {
                self.set_state(&mut inner, TxnPartState::Prepared);
                Completion::Prepared
            }
            TxnPartState::Working => {
                self.set_state(&mut inner, TxnPartState::Aborted);
                Completion::Failed(outcome.err_code)
            }
            _ => Completion::Preempted(outcome.err_code),
        }
    }

    /// Moves a prepared part to `Committed`.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.state.can_commit() {
            return Err(ParticipantError::IllegalTransition {
                part_id: self.id().clone(),
                from: inner.state,
                to: TxnPartState::Committed,
            });
        }
        self.set_state(&mut inner, TxnPartState::Committed);
        Ok(())
    }

    /// Moves the part to `Aborted`. Returns false if it already was.
    pub fn abort(&self) -> Result<bool> {
        let mut inner = self.lock();
        let current = inner.state;
        match current {
            TxnPartState::Aborted => Ok(false),
            state if state.can_abort() => {
                self.set_state(&mut inner, TxnPartState::Aborted);
                Ok(true)
            }
            state => Err(ParticipantError::IllegalTransition {
                part_id: self.id().clone(),
                from: state,
                to: TxnPartState::Aborted,
            }),
        }
    }

    /// Runs the rollbacker if nobody has yet.
    ///
    /// Returns `Ok(true)` if this call performed the rollback and
    /// `Ok(false)` if it was already done or the caller has not returned
    /// yet (the execution task rolls back on completion in that case).
    pub async fn rollback_once(&self) -> std::result::Result<bool, ProtocolViolation> {
        let rollbacker = {
            let mut inner = self.lock();
            if inner.err_code.is_none() || inner.rolled_back {
                return Ok(false);
            }
            inner.rolled_back = true;
            inner.rollbacker.take()
        };

        let Some(rollbacker) = rollbacker else {
            return Err(ProtocolViolation::MissingRollbacker {
                part_id: self.id().clone(),
                call_name: self.call_name().to_string(),
            });
        };

        rollbacker.rollback().await;
        metrics::counter!("participant_rollbacks_total").increment(1);
        tracing::debug!(part_id = %self.id(), "transaction part rolled back");
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PartInner> {
        self.inner.lock().expect("transaction part lock poisoned")
    }

    fn set_state(&self, inner: &mut PartInner, state: TxnPartState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }
}

impl std::fmt::Debug for TxnPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnPart")
            .field("id", self.id())
            .field("txn_id", self.txn_id())
            .field("shard_index", &self.shard_index())
            .field("call_name", &self.call_name())
            .field("state", &self.state())
            .finish()
    }
}
