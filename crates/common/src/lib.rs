//! Shared identifiers and wire records for the two-phase commit participant.

pub mod messages;
pub mod types;

pub use messages::{AbortArgs, AbortedArgs, Ack, CommitArgs, PreparedArgs, TxnPartRequest};
pub use types::{ErrorCode, ShardIndex, TxnId, TxnPartId};
