//! Accept loop with optional network fault injection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

use crate::endpoint::{BoundListener, BoxConnection, Endpoint};
use crate::error::Result;
use crate::server::RpcServer;

/// Size of the per-connection random draw.
pub const DRAW_RANGE: u32 = 1000;

/// Draws below this value drop the connection unread.
pub const DROP_BELOW: u32 = 100;

/// Draws below this value (and at or above [`DROP_BELOW`]) serve the
/// request but lose the reply.
pub const TRUNCATE_BELOW: u32 = 200;

/// What the listener does with an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close without reading: the request is lost.
    Drop,
    /// Shut down the write half, then serve: the reply is lost.
    Truncate,
    /// Serve normally.
    Serve,
}

impl Disposition {
    /// Maps a draw in `0..DRAW_RANGE` to a disposition: 10% drop, 10%
    /// truncate, 80% serve.
    pub fn from_draw(draw: u32) -> Self {
        if draw < DROP_BELOW {
            Disposition::Drop
        } else if draw < TRUNCATE_BELOW {
            Disposition::Truncate
        } else {
            Disposition::Serve
        }
    }
}

struct ListenerState {
    dead: AtomicBool,
    unreliable: AtomicBool,
    rpc_count: AtomicU64,
    shutdown: Notify,
}

impl ListenerState {
    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn disposition(&self) -> Disposition {
        if !self.unreliable.load(Ordering::SeqCst) {
            return Disposition::Serve;
        }
        Disposition::from_draw(rand::thread_rng().gen_range(0..DRAW_RANGE))
    }
}

/// Accepts connections and serves each one on its own task.
///
/// Test harnesses can flip the listener into unreliable mode, where every
/// accepted connection is either dropped, served with its reply lost, or
/// served normally (see [`Disposition::from_draw`]). Dropping the handle
/// kills the listener.
pub struct Listener {
    local: Endpoint,
    state: Arc<ListenerState>,
}

impl Listener {
    /// Binds `endpoint` and starts the accept loop.
    pub async fn bind(endpoint: &Endpoint, server: RpcServer) -> Result<Self> {
        let bound = BoundListener::bind(endpoint).await?;
        let local = bound.local_endpoint()?;
        let state = Arc::new(ListenerState {
            dead: AtomicBool::new(false),
            unreliable: AtomicBool::new(false),
            rpc_count: AtomicU64::new(0),
            shutdown: Notify::new(),
        });

        tracing::info!(endpoint = %local, "rpc listener started");
        tokio::spawn(accept_loop(bound, server, Arc::clone(&state), local.clone()));

        Ok(Self { local, state })
    }

    /// The endpoint clients should dial.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// Stops accepting connections and closes the socket. Connections
    /// already being served run to completion.
    pub fn kill(&self) {
        if !self.state.dead.swap(true, Ordering::SeqCst) {
            self.state.shutdown.notify_one();
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state.is_dead()
    }

    pub fn set_unreliable(&self, unreliable: bool) {
        self.state.unreliable.store(unreliable, Ordering::SeqCst);
    }

    pub fn is_unreliable(&self) -> bool {
        self.state.unreliable.load(Ordering::SeqCst)
    }

    /// Number of connections handed to the server (served or truncated).
    pub fn rpc_count(&self) -> u64 {
        self.state.rpc_count.load(Ordering::SeqCst)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.kill();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local", &self.local)
            .field("dead", &self.is_dead())
            .field("unreliable", &self.is_unreliable())
            .field("rpc_count", &self.rpc_count())
            .finish()
    }
}

async fn accept_loop(
    bound: BoundListener,
    server: RpcServer,
    state: Arc<ListenerState>,
    local: Endpoint,
) {
    while !state.is_dead() {
        let accepted = tokio::select! {
            () = state.shutdown.notified() => break,
            accepted = bound.accept() => accepted,
        };

        match accepted {
            Ok(conn) if state.is_dead() => drop(conn),
            Ok(conn) => handle_connection(conn, &server, &state),
            Err(e) => {
                if !state.is_dead() {
                    tracing::warn!(endpoint = %local, error = %e, "accept failed");
                }
            }
        }
    }

    drop(bound);
    remove_socket_file(&local);
    tracing::info!(endpoint = %local, "rpc listener stopped");
}

#[cfg(unix)]
fn remove_socket_file(endpoint: &Endpoint) {
    if let Endpoint::Unix(path) = endpoint {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(not(unix))]
fn remove_socket_file(_endpoint: &Endpoint) {}

fn handle_connection(conn: BoxConnection, server: &RpcServer, state: &ListenerState) {
    match state.disposition() {
        Disposition::Drop => {
            metrics::counter!("rpc_connections_dropped_total").increment(1);
            drop(conn);
        }
        Disposition::Truncate => {
            metrics::counter!("rpc_connections_truncated_total").increment(1);
            state.rpc_count.fetch_add(1, Ordering::SeqCst);
            let server = server.clone();
            tokio::spawn(async move {
                let (reader, mut writer) = tokio::io::split(conn);
                if let Err(e) = writer.shutdown().await {
                    tracing::warn!(error = %e, "shutdown of write half failed");
                }
                drop(writer);
                if let Err(e) = server.serve_conn(reader, tokio::io::sink()).await {
                    tracing::debug!(error = %e, "truncated connection ended");
                }
            });
        }
        Disposition::Serve => {
            state.rpc_count.fetch_add(1, Ordering::SeqCst);
            let server = server.clone();
            tokio::spawn(async move {
                let (reader, writer) = tokio::io::split(conn);
                if let Err(e) = server.serve_conn(reader, writer).await {
                    tracing::debug!(error = %e, "connection ended with error");
                }
            });
        }
    }
}
