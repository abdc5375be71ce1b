//! Structured Logging
//!
//! Provides structured logging with:
//! - JSON output for log aggregation
//! - Correlation IDs tying together the transactions of one auction
//! - Chain, proof and settlement event helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use integral_auction::common::logging::{init_logging, LogLevel};
//!
//! // Initialize at startup
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//!
//! // Log events
//! info!(target: "integral::chain", txid = %txid, "split signed");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Split, offer and shutdown transactions
    Chain,
    /// Merkle proof and header chain handling
    Proof,
    /// Settlement call assembly
    Settlement,
    /// Chain data source traffic
    Network,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_filter().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Render this event as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Log a transaction produced by the chain builder
pub fn log_chain_event(event_type: &str, txid: &str, value_sats: u64, inputs: usize) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Chain, event_type)
        .with_correlation_id(txid)
        .with_data(serde_json::json!({
            "txid": txid,
            "value_sats": value_sats,
            "inputs": inputs
        }));

    tracing::info!(target: "integral::chain", "{}", event.to_json());
}

/// Log a proof verification result
pub fn log_proof_event(leaf: &str, position: u32, depth: usize, valid: bool) {
    let level = if valid { LogLevel::Debug } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Proof, "merkle proof checked")
        .with_correlation_id(leaf)
        .with_data(serde_json::json!({
            "leaf": leaf,
            "position": position,
            "depth": depth,
            "valid": valid
        }));

    if valid {
        tracing::debug!(target: "integral::proof", "{}", event.to_json());
    } else {
        event = event.with_error("PROOF_MISMATCH", "recomputed root differs");
        tracing::warn!(target: "integral::proof", "{}", event.to_json());
    }
}

/// Log one item of a settlement batch
pub fn log_settlement_event(
    call: &str,
    index: usize,
    nonce: Option<u64>,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Settlement, call).with_data(
        serde_json::json!({
            "index": index,
            "nonce": nonce,
            "success": success
        }),
    );

    if let Some(err) = error {
        event = event.with_error("SETTLEMENT_ERROR", err);
    }

    if success {
        tracing::info!(target: "integral::settlement", "{}", event.to_json());
    } else {
        tracing::error!(target: "integral::settlement", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "integral={level},integral_auction={level},reqwest=warn",
            level = level.as_filter()
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from AuctionConfig
pub fn init_from_config(config: &super::config::AuctionConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == super::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Chain, "split signed")
            .with_correlation_id("abc-123")
            .with_data(serde_json::json!({"value_sats": 5000}));

        let json = event.to_json();
        assert!(json.contains("split signed"));
        assert!(json.contains("abc-123"));
        assert!(json.contains("\"chain\""));
        assert!(json.contains("5000"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_log_event_with_error() {
        let event = LogEvent::new(LogLevel::Error, EventCategory::Settlement, "claim")
            .with_error("SETTLEMENT_ERROR", "encoder rejected");
        let json = event.to_json();
        assert!(json.contains("\"level\":\"ERROR\""));
        assert!(json.contains("encoder rejected"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }
}
