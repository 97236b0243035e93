//! Service registry and per-connection request loop.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, RpcError};
use crate::frame::{Request, Response, read_frame, write_frame};

/// A named set of RPC methods.
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used as the `Service` half of `Service.Method`.
    fn name(&self) -> &str;

    /// Handles one call to `method` with JSON-encoded parameters.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

/// Decodes the parameters of a call into a typed record.
pub fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    Ok(serde_json::from_value(params)?)
}

/// Encodes a typed reply.
pub fn encode_reply<T: Serialize>(reply: &T) -> Result<Value> {
    Ok(serde_json::to_value(reply)?)
}

/// Dispatches requests to registered services.
#[derive(Clone, Default)]
pub struct RpcServer {
    services: Arc<RwLock<HashMap<String, Arc<dyn Service>>>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under its name.
    pub fn register(&self, service: Arc<dyn Service>) -> Result<()> {
        let mut services = self.services.write().expect("service registry lock poisoned");
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }
        tracing::debug!(service = %name, "rpc service registered");
        services.insert(name, service);
        Ok(())
    }

    /// Returns the names of all registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let services = self.services.read().expect("service registry lock poisoned");
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Routes a `Service.Method` call to its service.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        let (service_name, method_name) = method
            .split_once('.')
            .ok_or_else(|| RpcError::MalformedMethod(method.to_string()))?;

        let service = self
            .services
            .read()
            .expect("service registry lock poisoned")
            .get(service_name)
            .cloned()
            .ok_or_else(|| RpcError::UnknownService(service_name.to_string()))?;

        service.call(method_name, params).await
    }

    /// Serves sequential requests read from `reader` until the peer
    /// closes the stream. Replies go to `writer`.
    pub async fn serve_conn<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some(request) = read_frame::<_, Request>(&mut reader).await? {
            metrics::counter!("rpc_requests_total").increment(1);
            let response = match self.dispatch(&request.method, request.params).await {
                Ok(result) => Response::ok(request.seq, result),
                Err(e) => {
                    tracing::debug!(method = %request.method, error = %e, "rpc call failed");
                    Response::err(request.seq, e.to_string())
                }
            };
            write_frame(&mut writer, &response).await?;
        }
        Ok(())
    }
}
