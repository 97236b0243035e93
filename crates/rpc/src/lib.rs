//! Framed JSON RPC transport.
//!
//! Provides the plumbing the participant and its coordinator talk over:
//! - length-prefixed JSON frames carrying `Service.Method` requests
//! - a service registry that dispatches requests read from a connection
//! - a client and a bounded pool of clients with scoped borrowing
//! - a listener that can drop connections or truncate replies to emulate
//!   an unreliable network

pub mod client;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod listener;
pub mod pool;
pub mod server;

pub use client::RpcClient;
pub use endpoint::Endpoint;
pub use error::{Result, RpcError};
pub use listener::{Disposition, Listener};
pub use pool::{ConnectionPool, DEFAULT_POOL_SIZE};
pub use server::{RpcServer, Service, decode_params, encode_reply};
