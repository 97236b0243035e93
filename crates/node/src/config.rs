//! Node configuration loaded from environment variables.

use participant::{ParticipantConfig, ParticipantError, Result};

/// Node configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `ADMIN_HOST` — admin HTTP bind address (default: `"0.0.0.0"`)
/// - `ADMIN_PORT` — admin HTTP port (default: `3000`)
/// - `UNRELIABLE` — start the RPC listener in unreliable mode (default: `false`)
/// - `LEDGER_ACCOUNTS` — opening balances as `name=amount,...` (default: none)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
///
/// Participant settings come from [`ParticipantConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub admin_host: String,
    pub admin_port: u16,
    pub unreliable: bool,
    pub accounts: Vec<(String, u64)>,
    pub log_level: String,
    pub participant: ParticipantConfig,
}

impl NodeConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            admin_host: std::env::var("ADMIN_HOST").unwrap_or(defaults.admin_host),
            admin_port: std::env::var("ADMIN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.admin_port),
            unreliable: std::env::var("UNRELIABLE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.unreliable),
            accounts: match std::env::var("LEDGER_ACCOUNTS") {
                Ok(value) => parse_accounts(&value)?,
                Err(_) => defaults.accounts,
            },
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            participant: ParticipantConfig::from_env()?,
        })
    }

    /// Returns the `"host:port"` admin bind address string.
    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.admin_host, self.admin_port)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            admin_host: "0.0.0.0".to_string(),
            admin_port: 3000,
            unreliable: false,
            accounts: Vec::new(),
            log_level: "info".to_string(),
            participant: ParticipantConfig::default(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_accounts(value: &str) -> Result<Vec<(String, u64)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(String, u64)> {
            let (name, amount) = entry.split_once('=').ok_or_else(|| {
                ParticipantError::Config(format!(
                    "LEDGER_ACCOUNTS: expected name=amount, got '{entry}'"
                ))
            })?;
            let amount = amount.trim().parse::<u64>().map_err(|e| {
                ParticipantError::Config(format!("LEDGER_ACCOUNTS: bad amount for '{name}': {e}"))
            })?;
            Ok((name.trim().to_string(), amount))
        })
        .collect()
}
