//! In-memory account ledger with debit and credit callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::caller::{CallOutcome, Caller, NoopRollbacker, Rollbacker};

/// The input could not be decoded as a [`TransferInput`].
pub const ERR_INVALID_INPUT: ErrorCode = ErrorCode::new(1);
/// The account does not exist.
pub const ERR_UNKNOWN_ACCOUNT: ErrorCode = ErrorCode::new(2);
/// A debit would take the balance below zero.
pub const ERR_INSUFFICIENT_FUNDS: ErrorCode = ErrorCode::new(7);

/// Input accepted by the ledger callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInput {
    pub account: String,
    pub amount: u64,
}

impl TransferInput {
    pub fn new(account: impl Into<String>, amount: u64) -> Self {
        Self {
            account: account.into(),
            amount,
        }
    }

    /// Encodes the input for a [`common::TxnPartRequest`].
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "account": self.account, "amount": self.amount })
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
}

/// In-memory ledger. Clones share the same balances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account or resets its balance.
    pub fn open_account(&self, account: impl Into<String>, balance: u64) {
        self.write().balances.insert(account.into(), balance);
    }

    pub fn balance(&self, account: &str) -> Option<u64> {
        self.read().balances.get(account).copied()
    }

    /// Sum of all balances.
    pub fn total(&self) -> u64 {
        self.read().balances.values().sum()
    }

    /// Withdraws `amount`, failing without side effects.
    pub fn debit(&self, account: &str, amount: u64) -> Result<u64, ErrorCode> {
        let mut state = self.write();
        let balance = state
            .balances
            .get_mut(account)
            .ok_or(ERR_UNKNOWN_ACCOUNT)?;
        if *balance < amount {
            return Err(ERR_INSUFFICIENT_FUNDS);
        }
        *balance -= amount;
        Ok(*balance)
    }

    /// Deposits `amount`, failing without side effects.
    pub fn credit(&self, account: &str, amount: u64) -> Result<u64, ErrorCode> {
        let mut state = self.write();
        let balance = state
            .balances
            .get_mut(account)
            .ok_or(ERR_UNKNOWN_ACCOUNT)?;
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }

    /// Caller that withdraws from an account.
    pub fn debit_caller(&self) -> DebitCaller {
        DebitCaller {
            ledger: self.clone(),
        }
    }

    /// Caller that deposits into an account.
    pub fn credit_caller(&self) -> CreditCaller {
        CreditCaller {
            ledger: self.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.state.read().expect("ledger lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        self.state.write().expect("ledger lock poisoned")
    }
}

fn decode(input: &Value) -> Option<TransferInput> {
    match serde_json::from_value(input.clone()) {
        Ok(input) => Some(input),
        Err(e) => {
            tracing::debug!(error = %e, "invalid ledger input");
            None
        }
    }
}

/// Withdraws `amount` from `account`. Rolled back by depositing it again.
#[derive(Debug, Clone)]
pub struct DebitCaller {
    ledger: InMemoryLedger,
}

#[async_trait]
impl Caller for DebitCaller {
    async fn call(&self, input: &Value) -> CallOutcome {
        let Some(input) = decode(input) else {
            return CallOutcome::failed(ERR_INVALID_INPUT, NoopRollbacker);
        };
        match self.ledger.debit(&input.account, input.amount) {
            Ok(_) => CallOutcome::ok(Compensation::Credit {
                ledger: self.ledger.clone(),
                input,
            }),
            Err(code) => CallOutcome::failed(code, NoopRollbacker),
        }
    }
}

/// Deposits `amount` into `account`. Rolled back by withdrawing it again.
#[derive(Debug, Clone)]
pub struct CreditCaller {
    ledger: InMemoryLedger,
}

#[async_trait]
impl Caller for CreditCaller {
    async fn call(&self, input: &Value) -> CallOutcome {
        let Some(input) = decode(input) else {
            return CallOutcome::failed(ERR_INVALID_INPUT, NoopRollbacker);
        };
        match self.ledger.credit(&input.account, input.amount) {
            Ok(_) => CallOutcome::ok(Compensation::Debit {
                ledger: self.ledger.clone(),
                input,
            }),
            Err(code) => CallOutcome::failed(code, NoopRollbacker),
        }
    }
}

enum Compensation {
    Credit {
        ledger: InMemoryLedger,
        input: TransferInput,
    },
    Debit {
        ledger: InMemoryLedger,
        input: TransferInput,
    },
}

#[async_trait]
impl Rollbacker for Compensation {
    async fn rollback(&self) {
        let result = match self {
            Compensation::Credit { ledger, input } => ledger.credit(&input.account, input.amount),
            Compensation::Debit { ledger, input } => {
                // The deposit may already have been spent by a later debit.
                let mut state = ledger.write();
                match state.balances.get_mut(&input.account) {
                    Some(balance) => {
                        *balance = balance.saturating_sub(input.amount);
                        Ok(*balance)
                    }
                    None => Err(ERR_UNKNOWN_ACCOUNT),
                }
            }
        };
        if let Err(code) = result {
            tracing::warn!(account = %self.account(), %code, "ledger compensation failed");
        }
    }
}

impl Compensation {
    fn account(&self) -> &str {
        match self {
            Compensation::Credit { input, .. } | Compensation::Debit { input, .. } => {
                &input.account
            }
        }
    }
}
