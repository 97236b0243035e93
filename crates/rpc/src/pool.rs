//! Bounded pool of RPC clients.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use crate::client::RpcClient;
use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};

/// Default number of connections held toward one peer.
pub const DEFAULT_POOL_SIZE: usize = 5;

struct PoolInner {
    endpoint: Endpoint,
    size: usize,
    permits: Semaphore,
    idle: Mutex<Vec<RpcClient>>,
}

/// A fixed-size pool of connections to a single endpoint.
///
/// Connections are only reachable through [`ConnectionPool::call`], which
/// borrows one for exactly one RPC and gives it back on every exit path.
/// When all connections are in use, callers wait for one to be returned.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a pool of at most `size` connections. Connections are
    /// dialed lazily.
    pub fn new(endpoint: Endpoint, size: usize) -> Self {
        let size = size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                endpoint,
                size,
                permits: Semaphore::new(size),
                idle: Mutex::new(Vec::with_capacity(size)),
            }),
        }
    }

    /// Number of connections not currently borrowed.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Number of open connections waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().expect("pool lock poisoned").len()
    }

    /// Performs one RPC on a pooled connection.
    ///
    /// A connection that hit a transport failure is discarded so the next
    /// borrower dials afresh.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| RpcError::PoolClosed)?;

        let idle = self.inner.idle.lock().expect("pool lock poisoned").pop();
        let mut client = match idle {
            Some(client) => client,
            None => RpcClient::connect(&self.inner.endpoint).await?,
        };

        let result = client.call(method, args).await;
        match &result {
            Err(e) if e.is_transport() => {
                tracing::debug!(
                    endpoint = %self.inner.endpoint,
                    %method,
                    error = %e,
                    "discarding pooled connection"
                );
            }
            _ => self
                .inner
                .idle
                .lock()
                .expect("pool lock poisoned")
                .push(client),
        }
        result
    }

    /// Closes the pool. Pending and future calls fail with
    /// [`RpcError::PoolClosed`].
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner.idle.lock().expect("pool lock poisoned").clear();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.inner.endpoint)
            .field("size", &self.inner.size)
            .field("available", &self.available())
            .finish()
    }
}
