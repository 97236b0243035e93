//! Inbound RPC surface of the participant.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AbortArgs, Ack, CommitArgs, TxnPartRequest};
use rpc::{Endpoint, Listener, RpcError, RpcServer, Service, decode_params, encode_reply};
use serde_json::Value;

use crate::error::Result;
use crate::notifier::CoordinatorClient;
use crate::participant::Participant;

/// Service half of every participant method name.
pub const SERVICE_NAME: &str = "Participant";

pub const SUBMIT_TXN_PART: &str = "SubmitTxnPart";
pub const ABORT: &str = "Abort";
pub const COMMIT: &str = "Commit";

/// Exposes a [`Participant`] as the `Participant` RPC service.
///
/// Handler failures are returned to the caller as application errors;
/// protocol violations have already been handed to the supervisor.
pub struct ParticipantService<C> {
    participant: Participant<C>,
}

impl<C: CoordinatorClient> ParticipantService<C> {
    pub fn new(participant: Participant<C>) -> Self {
        Self { participant }
    }
}

#[async_trait]
impl<C: CoordinatorClient> Service for ParticipantService<C> {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn call(&self, method: &str, params: Value) -> rpc::Result<Value> {
        match method {
            SUBMIT_TXN_PART => {
                let request: TxnPartRequest = decode_params(params)?;
                self.participant.submit_txn_part(request);
            }
            ABORT => {
                let args: AbortArgs = decode_params(params)?;
                self.participant
                    .abort(&args.txn_part_id)
                    .await
                    .map_err(|e| RpcError::Application(e.to_string()))?;
            }
            COMMIT => {
                let args: CommitArgs = decode_params(params)?;
                self.participant
                    .commit(&args.txn_part_id)
                    .map_err(|e| RpcError::Application(e.to_string()))?;
            }
            other => return Err(RpcError::UnknownMethod(format!("{SERVICE_NAME}.{other}"))),
        }
        encode_reply(&Ack)
    }
}

/// A participant bound to an endpoint.
///
/// Owns the listener; dropping the server kills it.
pub struct ParticipantServer<C> {
    participant: Participant<C>,
    rpc: RpcServer,
    listener: Listener,
}

impl<C: CoordinatorClient> ParticipantServer<C> {
    /// Registers the participant service and starts accepting connections.
    pub async fn bind(endpoint: &Endpoint, participant: Participant<C>) -> Result<Self> {
        let rpc = RpcServer::new();
        rpc.register(Arc::new(ParticipantService::new(participant.clone())))?;
        let listener = Listener::bind(endpoint, rpc.clone()).await?;
        tracing::info!(endpoint = %listener.local_endpoint(), "participant listening");

        Ok(Self {
            participant,
            rpc,
            listener,
        })
    }

    pub fn participant(&self) -> &Participant<C> {
        &self.participant
    }

    /// Adds another service to the same listener.
    pub fn register_service(&self, service: Arc<dyn Service>) -> Result<()> {
        self.rpc.register(service)?;
        Ok(())
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        self.listener.local_endpoint()
    }

    /// Stops accepting connections.
    pub fn kill(&self) {
        self.listener.kill();
    }

    pub fn is_dead(&self) -> bool {
        self.listener.is_dead()
    }

    pub fn set_unreliable(&self, unreliable: bool) {
        self.listener.set_unreliable(unreliable);
    }

    pub fn is_unreliable(&self) -> bool {
        self.listener.is_unreliable()
    }

    /// Requests served so far, including ones whose reply was truncated.
    pub fn rpc_count(&self) -> u64 {
        self.listener.rpc_count()
    }
}
