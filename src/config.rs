//! Bot configuration, loaded from the environment (with a `.env` file) or a
//! JSON file. Network entries name the environment variables that hold the
//! actual RPC URLs, so endpoints never land in config files.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Env-var names of the available RPC endpoints (WebSocket).
    pub available_networks: Vec<String>,
    pub read_and_write_network_index: usize,
    /// Index of a separate write endpoint, or -1 to reuse the read endpoint.
    pub write_only_network_index: i64,
    /// Env-var name holding the executor account's private key.
    pub use_account: String,

    pub flash_query_address: Address,
    pub executor_address: Address,
    pub token_providence_address: Address,

    /// BASE_NATIVE for indicative pricing, in whole native units.
    pub base_native_pricing_amount: f64,
    /// Liquidity gate on the native side, in whole native units.
    pub minimum_native_amount: f64,
    /// Seed profit floor before the first gas quote, in whole native units.
    pub minimum_profit: f64,
    pub min_profit_followup_divisor: u64,
    pub gas_price_buffer_gwei: f64,

    pub banned_tokens: Vec<Address>,
    /// Event coalescing window, in microseconds.
    pub event_delay_micros: u64,

    pub debug_mode: bool,
    pub performance_mode: bool,
    /// Directory for registry snapshots (written live, read in debug mode).
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self {
            available_networks: env::var("AVAILABLE_NETWORKS")
                .unwrap_or_else(|_| "METIS_RPC_WS".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            read_and_write_network_index: env::var("READ_AND_WRITE_NETWORK_INDEX")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("invalid READ_AND_WRITE_NETWORK_INDEX")?,

            write_only_network_index: env::var("WRITE_ONLY_NETWORK_INDEX")
                .unwrap_or_else(|_| "-1".to_string())
                .parse()
                .context("invalid WRITE_ONLY_NETWORK_INDEX")?,

            use_account: env::var("USE_ACCOUNT")
                .unwrap_or_else(|_| "EXECUTOR_PRIVATE_KEY".to_string()),

            flash_query_address: env::var("FLASH_QUERY_ADDRESS")
                .context("FLASH_QUERY_ADDRESS not set")?
                .parse()
                .context("invalid FLASH_QUERY_ADDRESS")?,

            executor_address: env::var("EXECUTOR_ADDRESS")
                .context("EXECUTOR_ADDRESS not set")?
                .parse()
                .context("invalid EXECUTOR_ADDRESS")?,

            token_providence_address: env::var("TOKEN_PROVIDENCE_ADDRESS")
                .context("TOKEN_PROVIDENCE_ADDRESS not set")?
                .parse()
                .context("invalid TOKEN_PROVIDENCE_ADDRESS")?,

            base_native_pricing_amount: env::var("BASE_NATIVE_PRICING_AMOUNT")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()
                .context("invalid BASE_NATIVE_PRICING_AMOUNT")?,

            minimum_native_amount: env::var("MINIMUM_NATIVE_AMOUNT")
                .unwrap_or_else(|_| "10.0".to_string())
                .parse()
                .context("invalid MINIMUM_NATIVE_AMOUNT")?,

            minimum_profit: env::var("MINIMUM_PROFIT")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()
                .context("invalid MINIMUM_PROFIT")?,

            min_profit_followup_divisor: env::var("MIN_PROFIT_FOLLOWUP_DIVISOR")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("invalid MIN_PROFIT_FOLLOWUP_DIVISOR")?,

            gas_price_buffer_gwei: env::var("GAS_PRICE_BUFFER_GWEI")
                .unwrap_or_else(|_| "5.0".to_string())
                .parse()
                .context("invalid GAS_PRICE_BUFFER_GWEI")?,

            banned_tokens: env::var("BANNED_TOKENS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().context("invalid address in BANNED_TOKENS"))
                .collect::<Result<Vec<Address>>>()?,

            event_delay_micros: env::var("EVENT_DELAY_MICROS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("invalid EVENT_DELAY_MICROS")?,

            debug_mode: env::var("DEBUG_MODE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("invalid DEBUG_MODE")?,

            performance_mode: env::var("PERFORMANCE_MODE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("invalid PERFORMANCE_MODE")?,

            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
        })
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("failed to read config file")?;
        serde_json::from_str(&content).context("failed to parse config file")
    }

    pub fn event_delay(&self) -> Duration {
        Duration::from_micros(self.event_delay_micros)
    }

    /// Env-var name of the read (and subscription) endpoint.
    pub fn read_network_var(&self) -> Result<&str> {
        self.available_networks
            .get(self.read_and_write_network_index)
            .map(String::as_str)
            .context("READ_AND_WRITE_NETWORK_INDEX out of range")
    }

    /// Env-var name of the dedicated write endpoint, if one is configured.
    pub fn write_network_var(&self) -> Result<Option<&str>> {
        if self.write_only_network_index < 0 {
            return Ok(None);
        }
        self.available_networks
            .get(self.write_only_network_index as usize)
            .map(|s| Some(s.as_str()))
            .context("WRITE_ONLY_NETWORK_INDEX out of range")
    }
}
