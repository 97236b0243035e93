//! Records exchanged between the coordinator and a participant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ErrorCode, ShardIndex, TxnId, TxnPartId};

/// Inbound method: submit a transaction part for execution.
pub const METHOD_SUBMIT_TXN_PART: &str = "Participant.SubmitTxnPart";

/// Inbound method: abort a transaction part.
pub const METHOD_ABORT: &str = "Participant.Abort";

/// Inbound method: commit a transaction part.
pub const METHOD_COMMIT: &str = "Participant.Commit";

/// Outbound method: report a prepared vote.
pub const METHOD_INFORM_PREPARED: &str = "Coordinator.InformPrepared";

/// Outbound method: report an aborted vote.
pub const METHOD_INFORM_ABORTED: &str = "Coordinator.InformAborted";

/// A unit of work submitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxnPartRequest {
    /// Unique identity of the part within this participant.
    pub id: TxnPartId,
    pub txn_id: TxnId,
    pub shard_index: ShardIndex,
    /// Name of the registered caller that executes the part.
    pub call_name: String,
    /// Opaque input handed to the caller.
    #[serde(default)]
    pub input: Value,
}

impl TxnPartRequest {
    /// Creates a request whose identity is composed from the transaction
    /// ID and shard index.
    pub fn new(
        txn_id: impl Into<TxnId>,
        shard_index: u32,
        call_name: impl Into<String>,
        input: Value,
    ) -> Self {
        let txn_id = txn_id.into();
        let shard_index = ShardIndex::new(shard_index);
        Self {
            id: TxnPartId::compose(&txn_id, shard_index),
            txn_id,
            shard_index,
            call_name: call_name.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortArgs {
    pub txn_part_id: TxnPartId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitArgs {
    pub txn_part_id: TxnPartId,
}

/// Vote sent to the coordinator once a part's caller succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedArgs {
    pub shard_index: ShardIndex,
    pub txn_id: TxnId,
    pub err_code: ErrorCode,
}

/// Vote sent to the coordinator once a part's caller failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedArgs {
    pub shard_index: ShardIndex,
    pub txn_id: TxnId,
    pub err_code: ErrorCode,
}

/// Empty acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack;
