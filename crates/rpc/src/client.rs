//! Single-connection RPC client.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::endpoint::{BoxConnection, Endpoint};
use crate::error::{Result, RpcError};
use crate::frame::{Request, Response, read_frame, write_frame};

/// A client bound to one connection. Calls are issued one at a time.
pub struct RpcClient {
    endpoint: Endpoint,
    conn: BoxConnection,
    next_seq: u64,
}

impl RpcClient {
    /// Dials `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let conn = endpoint.connect().await?;
        Ok(Self {
            endpoint: endpoint.clone(),
            conn,
            next_seq: 0,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Sends one request and waits for its reply.
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.next_seq += 1;
        let seq = self.next_seq;

        let request = Request {
            seq,
            method: method.to_string(),
            params: serde_json::to_value(args)?,
        };
        write_frame(&mut self.conn, &request).await?;

        let response: Response = read_frame(&mut self.conn)
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        if response.seq != seq {
            return Err(RpcError::SequenceMismatch {
                expected: seq,
                actual: response.seq,
            });
        }
        if let Some(error) = response.error {
            return Err(RpcError::Remote(error));
        }

        Ok(serde_json::from_value(
            response.result.unwrap_or(Value::Null),
        )?)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint)
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
