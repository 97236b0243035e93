//! At-least-once delivery of votes to the coordinator.

use async_trait::async_trait;
use common::messages::{METHOD_INFORM_ABORTED, METHOD_INFORM_PREPARED};
use common::{AbortedArgs, Ack, PreparedArgs};
use rpc::ConnectionPool;

use crate::config::RetryPolicy;
use crate::error::{ParticipantError, Result};

/// The coordinator's vote-collection endpoints.
///
/// Implementations must tolerate duplicate delivery: a vote whose reply was
/// lost is sent again.
#[async_trait]
pub trait CoordinatorClient: Send + Sync + 'static {
    async fn inform_prepared(&self, args: &PreparedArgs) -> rpc::Result<()>;

    async fn inform_aborted(&self, args: &AbortedArgs) -> rpc::Result<()>;
}

/// Coordinator client that issues RPCs over a connection pool.
#[derive(Debug, Clone)]
pub struct RpcCoordinatorClient {
    pool: ConnectionPool,
}

impl RpcCoordinatorClient {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl CoordinatorClient for RpcCoordinatorClient {
    async fn inform_prepared(&self, args: &PreparedArgs) -> rpc::Result<()> {
        self.pool
            .call::<_, Ack>(METHOD_INFORM_PREPARED, args)
            .await
            .map(|_| ())
    }

    async fn inform_aborted(&self, args: &AbortedArgs) -> rpc::Result<()> {
        self.pool
            .call::<_, Ack>(METHOD_INFORM_ABORTED, args)
            .await
            .map(|_| ())
    }
}

/// A vote reported to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Prepared(PreparedArgs),
    Aborted(AbortedArgs),
}

impl Vote {
    pub fn method(&self) -> &'static str {
        match self {
            Vote::Prepared(_) => METHOD_INFORM_PREPARED,
            Vote::Aborted(_) => METHOD_INFORM_ABORTED,
        }
    }
}

/// Sends votes until the coordinator acknowledges them.
pub struct Notifier<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: CoordinatorClient> Notifier<C> {
    pub fn new(client: C, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Delivers `vote`, retrying on every failure as the retry policy
    /// allows. Returns the number of attempts it took.
    pub async fn deliver(&self, vote: &Vote) -> Result<u32> {
        let mut attempts = 0u32;
        loop {
            attempts = next_attempt(attempts);
            let result = match vote {
                Vote::Prepared(args) => self.client.inform_prepared(args).await,
                Vote::Aborted(args) => self.client.inform_aborted(args).await,
            };

            let error = match result {
                Ok(()) => {
                    tracing::debug!(method = vote.method(), attempts, "vote acknowledged");
                    return Ok(attempts);
                }
                Err(e) => e,
            };

            metrics::counter!("participant_inform_retries_total").increment(1);
            if error.is_transport() {
                tracing::debug!(method = vote.method(), attempts, %error, "vote not delivered");
            } else {
                tracing::warn!(method = vote.method(), attempts, %error, "vote rejected");
            }

            if self.retry.is_exhausted(attempts) {
                return Err(ParticipantError::RetriesExhausted {
                    method: vote.method(),
                    attempts,
                    last_error: error.to_string(),
                });
            }
            if !self.retry.backoff.is_zero() {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }
    }
}

/// Attempt counter that sticks at its maximum instead of wrapping; an
/// unlimited policy can outlive `u32`.
fn next_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}
