//! Application configuration loaded from environment variables.

use ledger_api::{auth, Amount};

use crate::errors::{NodeError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Oracle principal trusted by a brand-new ledger. Ignored once genesis
    /// has been recorded.
    pub oracle_address: Option<String>,
    /// Fee asset burned per oracle submission.
    pub submission_fee: Amount,
    /// Fee asset granted to the genesis oracle.
    pub oracle_fee_allowance: Amount,
    /// Accepted clock skew for signed requests, in seconds.
    pub signature_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let oracle_address = lookup("ORACLE_ADDRESS").filter(|v| !v.trim().is_empty());
        if let Some(oracle) = &oracle_address {
            auth::parse_principal(oracle.trim())
                .map_err(|e| NodeError::Config(format!("ORACLE_ADDRESS: {e}")))?;
        }

        let submission_fee = parse::<Amount>("SUBMISSION_FEE", &var("SUBMISSION_FEE", "1"))?;
        let oracle_fee_allowance =
            parse::<Amount>("ORACLE_FEE_ALLOWANCE", &var("ORACLE_FEE_ALLOWANCE", "10000"))?;
        if submission_fee < 0 || oracle_fee_allowance < 0 {
            return Err(NodeError::Config("fees must not be negative".to_string()));
        }

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite:./escrow_ledger.db"),
            api_port: parse("API_PORT", &var("API_PORT", "3002"))?,
            oracle_address: oracle_address.map(|v| v.trim().to_string()),
            submission_fee,
            oracle_fee_allowance,
            signature_window_secs: parse("SIGNATURE_WINDOW_SECS", &var("SIGNATURE_WINDOW_SECS", "300"))?,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NodeError::Config(format!("Invalid {key}")))
}
