//! Participant role of the two-phase commit protocol.
//!
//! A participant executes transaction parts submitted by a coordinator:
//! 1. Run the registered caller for the part
//! 2. Vote `Prepared` or `Aborted`, retrying until the coordinator answers
//! 3. Commit or abort when the coordinator decides
//!
//! Every part that ends up aborted after its caller ran is rolled back
//! exactly once, whichever path aborts it.

pub mod caller;
pub mod config;
pub mod error;
pub mod notifier;
pub mod part;
pub mod participant;
pub mod service;
pub mod services;
pub mod state;
pub mod supervisor;
pub mod table;

pub use caller::{CallOutcome, Caller, CallerRegistry, NoopRollbacker, Rollbacker};
pub use config::{ParticipantConfig, RetryPolicy};
pub use error::{ParticipantError, ProtocolViolation, Result};
pub use notifier::{CoordinatorClient, Notifier, RpcCoordinatorClient, Vote};
pub use part::{Completion, TxnPart};
pub use participant::Participant;
pub use service::{ParticipantServer, ParticipantService, SERVICE_NAME};
pub use services::{CreditCaller, DebitCaller, InMemoryLedger, TransferInput};
pub use state::TxnPartState;
pub use supervisor::{EXIT_PROTOCOL_VIOLATION, FatalReporter, Supervisor, supervisor};
pub use table::TxnPartTable;
