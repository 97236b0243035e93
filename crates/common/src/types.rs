use serde::{Deserialize, Serialize};

/// Identifier of a distributed transaction, assigned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxnId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Position of a shard within a transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardIndex(u32);

impl ShardIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ShardIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Unique key of a transaction part within a participant.
///
/// The participant treats the identity as opaque: it never derives one
/// from a transaction ID and shard index on its own. Coordinators that
/// want the canonical composition use [`TxnPartId::compose`], which yields
/// `"{txn_id}-{shard_index}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnPartId(String);

impl TxnPartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the canonical identity for one shard of a transaction.
    pub fn compose(txn_id: &TxnId, shard_index: ShardIndex) -> Self {
        Self(format!("{}-{}", txn_id, shard_index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxnPartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxnPartId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Result code of a business-logic call. Zero means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(i32);

impl ErrorCode {
    /// The success code.
    pub const OK: ErrorCode = ErrorCode(0);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub fn get(&self) -> i32 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}
