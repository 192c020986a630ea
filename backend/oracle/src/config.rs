//! Application configuration loaded from environment variables.

use std::time::Duration;

use ledger_api::Credential;

use crate::errors::{OracleError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between full sweeps over every active project
    pub poll_interval_secs: u64,
    /// Key this service signs attestations with; its public half is the
    /// oracle principal.
    pub credential: Credential,
    /// Base URL of the ledger node REST API
    pub ledger_endpoint: String,
    /// Base URL of the evidence provider
    pub evidence_endpoint: String,
    /// Bearer credential for the evidence provider
    pub evidence_api_key: String,
    /// Category used when a project's metadata names none
    pub default_category: Option<String>,
    /// Per-request timeout for evidence fetches
    pub evidence_timeout_secs: u64,
    /// Seconds between polls of the ledger event stream
    pub event_poll_interval_secs: u64,
    /// Path to the SQLite audit database
    pub database_url: String,
    /// Port for the status API
    pub api_port: u16,
    pub deployment_env: String,
    /// Registers the always-pass `manual-test` strategy
    pub allow_manual_verification: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| OracleError::Config(format!("Missing env var: {key}")))
        };
        let required = |key: &str| {
            var(key).map_err(|_| {
                OracleError::Config(format!("{key} environment variable is required"))
            })
        };
        let parsed = |key: &str, default: &str| -> Result<u64> {
            var(key)
                .unwrap_or_else(|_| default.to_string())
                .parse()
                .map_err(|_| OracleError::Config(format!("Invalid {key}")))
        };

        let config = Config {
            poll_interval_secs: parsed("POLL_INTERVAL_SECS", "60")?,
            credential: Credential::from_hex(&required("ORACLE_SECRET_KEY")?)
                .map_err(|e| OracleError::Config(format!("ORACLE_SECRET_KEY: {e}")))?,
            ledger_endpoint: trim_slash(required("LEDGER_ENDPOINT")?),
            evidence_endpoint: trim_slash(required("EVIDENCE_ENDPOINT")?),
            evidence_api_key: required("EVIDENCE_API_KEY")?,
            default_category: var("DEFAULT_CATEGORY").ok(),
            evidence_timeout_secs: parsed("EVIDENCE_TIMEOUT_SECS", "10")?,
            event_poll_interval_secs: parsed("EVENT_POLL_INTERVAL_SECS", "5")?,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./oracle_audit.db".to_string()),
            api_port: var("API_PORT")
                .unwrap_or_else(|_| "3003".to_string())
                .parse()
                .map_err(|_| OracleError::Config("Invalid API_PORT".to_string()))?,
            deployment_env: var("DEPLOYMENT_ENV").unwrap_or_else(|_| "development".to_string()),
            allow_manual_verification: match var("ALLOW_MANUAL_VERIFICATION").as_deref() {
                Ok("true") | Ok("1") => true,
                Ok("false") | Ok("0") | Err(_) => false,
                Ok(_) => {
                    return Err(OracleError::Config(
                        "Invalid ALLOW_MANUAL_VERIFICATION".to_string(),
                    ))
                }
            },
        };

        if config.poll_interval_secs == 0 || config.event_poll_interval_secs == 0 {
            return Err(OracleError::Config(
                "Poll intervals must be at least one second".to_string(),
            ));
        }
        if config.allow_manual_verification && config.is_production() {
            return Err(OracleError::Config(
                "ALLOW_MANUAL_VERIFICATION cannot be enabled in production".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.deployment_env.eq_ignore_ascii_case("production")
    }

    /// Principal the ledger must list as its oracle.
    pub fn identity(&self) -> String {
        self.credential.principal()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_secs(self.event_poll_interval_secs)
    }

    pub fn evidence_timeout(&self) -> Duration {
        Duration::from_secs(self.evidence_timeout_secs)
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
