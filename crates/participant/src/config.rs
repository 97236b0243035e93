//! Participant configuration loaded from environment variables.

use std::time::Duration;

use rpc::{DEFAULT_POOL_SIZE, Endpoint};

use crate::error::{ParticipantError, Result};

/// Retry behaviour for coordinator notifications.
///
/// The default retries forever without pausing. A cap or backoff lets test
/// suites bound their worst-case runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retries forever with no pause.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns true if no further attempt is allowed after `attempts`.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Participant configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `PARTICIPANT_ADDR` — RPC service endpoint (default: `"127.0.0.1:7001"`)
/// - `COORDINATOR_ADDR` — coordinator endpoint (default: `"127.0.0.1:7000"`)
/// - `POOL_SIZE` — coordinator connections (default: `5`)
/// - `INFORM_MAX_ATTEMPTS` — retry cap for votes (default: unlimited)
/// - `INFORM_BACKOFF_MS` — pause between vote retries (default: `0`)
///
/// Endpoints accept `host:port` or `unix:/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantConfig {
    pub service_endpoint: Endpoint,
    pub coordinator_endpoint: Endpoint,
    pub pool_size: usize,
    pub retry: RetryPolicy,
}

impl ParticipantConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for unset values. Malformed endpoints are rejected.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            service_endpoint: endpoint_var("PARTICIPANT_ADDR")?
                .unwrap_or(defaults.service_endpoint),
            coordinator_endpoint: endpoint_var("COORDINATOR_ADDR")?
                .unwrap_or(defaults.coordinator_endpoint),
            pool_size: parsed_var("POOL_SIZE").unwrap_or(defaults.pool_size),
            retry: RetryPolicy {
                max_attempts: parsed_var("INFORM_MAX_ATTEMPTS"),
                backoff: parsed_var("INFORM_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
        })
    }
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            service_endpoint: Endpoint::tcp("127.0.0.1:7001"),
            coordinator_endpoint: Endpoint::tcp("127.0.0.1:7000"),
            pool_size: DEFAULT_POOL_SIZE,
            retry: RetryPolicy::unlimited(),
        }
    }
}

fn endpoint_var(name: &str) -> Result<Option<Endpoint>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ParticipantError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
