//! Environment-based Configuration
//!
//! All auction parameters can be overridden from the environment; secrets
//! (the control key) MUST come from the environment, never from code.
//!
//! # Environment Variables
//!
//! ## Network
//! - `AUCTION_NETWORK` - "mainnet", "testnet", "signet" or "regtest" (default: "testnet")
//! - `AUCTION_ESPLORA_URL` - Esplora API endpoint URL
//!
//! ## Keys
//! - `AUCTION_CONTROL_KEY` - Hex-encoded control key for the auction outputs
//!
//! ## Auction Parameters
//! - `AUCTION_SLOT_SIZE_SATS` - Value of each auction slot (default: 550)
//! - `AUCTION_SPLIT_FEE_SATS` - Fee paid by the split transaction (default: 8000)
//! - `AUCTION_SHUTDOWN_FEE_SATS` - Fee paid by each shutdown step (default: 7700)
//!
//! ## Settlement
//! - `AUCTION_CONTRACT_ADDRESS` - Settlement contract address (0x-prefixed)
//! - `AUCTION_RESERVE_PRICE` - Reserve price passed to `open` (default: 1000000)
//! - `AUCTION_REQ_DIFFICULTY` - Difficulty required of the proof header chain (default: 0)
//! - `AUCTION_HEADER_COUNT` - Headers after the confirming block (default: 6)
//!
//! ## Optional Settings
//! - `AUCTION_LOG_LEVEL` - Logging level (debug, info, warn, error)

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use alloy_primitives::Address as EthAddress;
use bitcoin::Amount;
use thiserror::Error;

use crate::signer::KeyMaterial;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Bitcoin network the auction runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "AUCTION_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default Esplora API for this network
    pub fn default_esplora_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://blockstream.info/api",
            Network::Testnet => "https://blockstream.info/testnet/api",
            Network::Signet => "https://mempool.space/signet/api",
            Network::Regtest => "http://127.0.0.1:3002",
        }
    }

    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct AuctionConfig {
    /// Network environment
    pub network: Network,

    /// Esplora API endpoint
    pub esplora_url: String,

    /// Hex-encoded control key, if provided
    pub control_key: Option<String>,

    /// Value of each auction slot
    pub slot_size: Amount,

    /// Fee paid by the split transaction
    pub split_fee: Amount,

    /// Fee paid by each step of the shutdown cascade
    pub shutdown_fee: Amount,

    /// Settlement contract address
    pub contract_address: EthAddress,

    /// Reserve price passed to `open`
    pub reserve_price: u64,

    /// Difficulty the proof header chain must accumulate
    pub req_difficulty: u64,

    /// Number of headers to include after the confirming block
    pub header_count: u32,

    /// Log level
    pub log_level: String,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        let network = Network::Testnet;
        Self {
            network,
            esplora_url: network.default_esplora_url().to_string(),
            control_key: None,
            slot_size: Amount::from_sat(550),
            split_fee: Amount::from_sat(8_000),
            shutdown_fee: Amount::from_sat(7_700),
            contract_address: EthAddress::ZERO,
            reserve_price: 1_000_000,
            req_difficulty: 0,
            header_count: 6,
            log_level: "info".to_string(),
        }
    }
}

impl AuctionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let network: Network = lookup("AUCTION_NETWORK")
            .unwrap_or_else(|| "testnet".to_string())
            .parse()?;

        let esplora_url = lookup("AUCTION_ESPLORA_URL")
            .unwrap_or_else(|| network.default_esplora_url().to_string());

        let control_key = lookup("AUCTION_CONTROL_KEY").filter(|key| !key.is_empty());

        let slot_size = parse_or(&lookup, "AUCTION_SLOT_SIZE_SATS", defaults.slot_size.to_sat())?;
        let split_fee = parse_or(&lookup, "AUCTION_SPLIT_FEE_SATS", defaults.split_fee.to_sat())?;
        let shutdown_fee = parse_or(
            &lookup,
            "AUCTION_SHUTDOWN_FEE_SATS",
            defaults.shutdown_fee.to_sat(),
        )?;

        if slot_size == 0 {
            return Err(ConfigError::InvalidValue(
                "AUCTION_SLOT_SIZE_SATS".to_string(),
                "slot size must be positive".to_string(),
            ));
        }

        let contract_address =
            parse_or(&lookup, "AUCTION_CONTRACT_ADDRESS", defaults.contract_address)?;
        let reserve_price = parse_or(&lookup, "AUCTION_RESERVE_PRICE", defaults.reserve_price)?;
        let req_difficulty = parse_or(&lookup, "AUCTION_REQ_DIFFICULTY", defaults.req_difficulty)?;
        let header_count = parse_or(&lookup, "AUCTION_HEADER_COUNT", defaults.header_count)?;

        let log_level = lookup("AUCTION_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            network,
            esplora_url,
            control_key,
            slot_size: Amount::from_sat(slot_size),
            split_fee: Amount::from_sat(split_fee),
            shutdown_fee: Amount::from_sat(shutdown_fee),
            contract_address,
            reserve_price,
            req_difficulty,
            header_count,
            log_level,
        })
    }

    /// Control key as key material, if configured
    pub fn control_key_material(&self) -> Option<KeyMaterial> {
        self.control_key.clone().map(KeyMaterial::Hex)
    }

    /// Control key as key material, failing when it is absent
    pub fn require_control_key(&self) -> Result<KeyMaterial, ConfigError> {
        self.control_key_material()
            .ok_or_else(|| ConfigError::MissingEnvVar("AUCTION_CONTROL_KEY".to_string()))
    }

    /// Mainnet runs need a real contract and a configured control key
    pub fn validate_for_mainnet(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Ok(());
        }

        if self.contract_address == EthAddress::ZERO {
            return Err(ConfigError::MissingEnvVar(
                "AUCTION_CONTRACT_ADDRESS".to_string(),
            ));
        }

        self.require_control_key().map(|_| ())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Auction Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Esplora: {}", self.esplora_url);
        println!(
            "Control Key: {}",
            if self.control_key.is_some() { "configured" } else { "not set" }
        );
        println!("Slot Size: {} sats", self.slot_size.to_sat());
        println!("Split Fee: {} sats", self.split_fee.to_sat());
        println!("Shutdown Fee: {} sats", self.shutdown_fee.to_sat());
        println!("Contract: {}", self.contract_address);
        println!("Header Count: {}", self.header_count);
        println!("Log Level: {}", self.log_level);
        println!("=============================");
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
