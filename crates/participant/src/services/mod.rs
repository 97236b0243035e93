//! Callers shipped with the participant.

pub mod ledger;

pub use ledger::{
    CreditCaller, DebitCaller, ERR_INSUFFICIENT_FUNDS, ERR_INVALID_INPUT, ERR_UNKNOWN_ACCOUNT,
    InMemoryLedger, TransferInput,
};
