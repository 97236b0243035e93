//! The participant: owns in-flight parts and drives them through the
//! two-phase commit protocol.

use std::sync::Arc;
use std::time::Instant;

use common::{AbortedArgs, ErrorCode, PreparedArgs, TxnPartId, TxnPartRequest};
use rpc::ConnectionPool;

use crate::caller::{Caller, CallerRegistry};
use crate::config::{ParticipantConfig, RetryPolicy};
use crate::error::{ParticipantError, ProtocolViolation, Result};
use crate::notifier::{CoordinatorClient, Notifier, RpcCoordinatorClient, Vote};
use crate::part::{Completion, TxnPart};
use crate::state::TxnPartState;
use crate::supervisor::FatalReporter;
use crate::table::TxnPartTable;

struct Inner<C> {
    table: TxnPartTable,
    callers: CallerRegistry,
    notifier: Notifier<C>,
    reporter: FatalReporter,
}

/// Participant side of two-phase commit.
///
/// Submitted parts run on their own task: the registered caller executes,
/// the part becomes `Prepared` or `Aborted`, and the vote is sent to the
/// coordinator until acknowledged. The coordinator later commits or
/// aborts; both handlers pop the part from the table, so repeated or late
/// deliveries are no-ops.
pub struct Participant<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Participant<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Participant<RpcCoordinatorClient> {
    /// Creates a participant that reports to the coordinator named in
    /// `config` over a pool of RPC connections.
    pub fn from_config(config: &ParticipantConfig, reporter: FatalReporter) -> Self {
        let pool = ConnectionPool::new(config.coordinator_endpoint.clone(), config.pool_size);
        Self::new(RpcCoordinatorClient::new(pool), config.retry, reporter)
    }
}

impl<C: CoordinatorClient> Participant<C> {
    pub fn new(coordinator: C, retry: RetryPolicy, reporter: FatalReporter) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: TxnPartTable::new(),
                callers: CallerRegistry::new(),
                notifier: Notifier::new(coordinator, retry),
                reporter,
            }),
        }
    }

    /// Registers business logic under `name`. Must happen before any part
    /// naming it is submitted.
    pub fn register_caller(&self, name: impl Into<String>, caller: Arc<dyn Caller>) -> Result<()> {
        self.inner.callers.register(name, caller)
    }

    pub fn callers(&self) -> &CallerRegistry {
        &self.inner.callers
    }

    pub fn coordinator(&self) -> &C {
        self.inner.notifier.client()
    }

    /// Number of parts the coordinator has not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.table.len()
    }

    /// State of an in-flight part.
    pub fn part_state(&self, id: &TxnPartId) -> Option<TxnPartState> {
        self.inner.table.with_part(id, |part| part.state())
    }

    /// Registers the part and starts executing it in the background.
    ///
    /// An entry with the same identity is overwritten; the coordinator is
    /// responsible for keeping identities unique.
    pub fn submit_txn_part(&self, request: TxnPartRequest) -> Arc<TxnPart> {
        let part = Arc::new(TxnPart::new(request));
        if self.inner.table.put(Arc::clone(&part)).is_some() {
            tracing::warn!(part_id = %part.id(), "replaced in-flight part with the same identity");
        }
        metrics::counter!("participant_parts_submitted_total").increment(1);
        tracing::debug!(
            part_id = %part.id(),
            txn_id = %part.txn_id(),
            shard = %part.shard_index(),
            call = part.call_name(),
            "transaction part submitted"
        );

        let participant = self.clone();
        let task_part = Arc::clone(&part);
        tokio::spawn(async move { participant.execute(task_part).await });

        part
    }

    /// Coordinator-ordered abort. Unknown identities are ignored.
    ///
    /// Returns the part's final state if this call removed it.
    #[tracing::instrument(skip(self, id), fields(part_id = %id))]
    pub async fn abort(&self, id: &TxnPartId) -> Result<Option<TxnPartState>> {
        let Some(part) = self.inner.table.pop(id) else {
            tracing::debug!("abort for unknown part ignored");
            return Ok(None);
        };

        if part.abort()? {
            metrics::counter!("participant_parts_aborted_total").increment(1);
        }
        if let Err(violation) = part.rollback_once().await {
            self.inner.reporter.report(violation.clone());
            return Err(violation.into());
        }

        tracing::info!("transaction part aborted by coordinator");
        Ok(Some(part.state()))
    }

    /// Coordinator-ordered commit. Unknown identities are ignored.
    ///
    /// Returns the part's final state if this call removed it.
    #[tracing::instrument(skip(self, id), fields(part_id = %id))]
    pub fn commit(&self, id: &TxnPartId) -> Result<Option<TxnPartState>> {
        let Some(part) = self.inner.table.pop(id) else {
            tracing::debug!("commit for unknown part ignored");
            return Ok(None);
        };

        if let Err(e) = part.commit() {
            tracing::warn!(error = %e, "commit rejected");
            return Err(e);
        }

        metrics::counter!("participant_parts_committed_total").increment(1);
        tracing::info!("transaction part committed");
        Ok(Some(TxnPartState::Committed))
    }

    #[tracing::instrument(
        skip(self, part),
        fields(part_id = %part.id(), call = part.call_name())
    )]
    async fn execute(&self, part: Arc<TxnPart>) {
        match self.run(&part).await {
            Ok(()) => {}
            Err(ParticipantError::Fatal(violation)) => self.inner.reporter.report(violation),
            Err(e) => tracing::warn!(error = %e, "transaction part left unfinished"),
        }
    }

    async fn run(&self, part: &Arc<TxnPart>) -> Result<()> {
        let caller = self.inner.callers.get(part.call_name()).ok_or_else(|| {
            ProtocolViolation::UnregisteredCaller {
                part_id: part.id().clone(),
                call_name: part.call_name().to_string(),
            }
        })?;

        let started = Instant::now();
        let outcome = caller.call(part.input()).await;
        metrics::histogram!("participant_execution_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let err_code = match part.complete(outcome) {
            Completion::Prepared => {
                metrics::counter!("participant_parts_prepared_total").increment(1);
                tracing::info!("transaction part prepared");
                ErrorCode::OK
            }
            Completion::Failed(err_code) => {
                metrics::counter!("participant_parts_aborted_total").increment(1);
                tracing::info!(%err_code, "transaction part failed");
                self.inner.table.pop_exact(part);
                part.rollback_once().await?;
                err_code
            }
            Completion::Preempted(err_code) => {
                part.rollback_once().await?;
                tracing::info!(%err_code, "transaction part aborted before its caller returned");
                err_code
            }
        };

        // The vote reflects the caller's result even when the coordinator
        // already aborted the part.
        let vote = if err_code.is_ok() {
            Vote::Prepared(PreparedArgs {
                shard_index: part.shard_index(),
                txn_id: part.txn_id().clone(),
                err_code,
            })
        } else {
            Vote::Aborted(AbortedArgs {
                shard_index: part.shard_index(),
                txn_id: part.txn_id().clone(),
                err_code,
            })
        };
        self.inner.notifier.deliver(&vote).await?;
        Ok(())
    }
}
