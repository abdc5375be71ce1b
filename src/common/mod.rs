//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the auction tooling.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{AuctionConfig, ConfigError, Network};
pub use error::{AuctionError, Result};
pub use logging::{
    init_from_config, init_logging, log_chain_event, log_proof_event,
    log_settlement_event, ErrorDetails, EventCategory, LogEvent, LogLevel, LoggingError,
};
