//! Common Error Types
//!
//! Each component owns a typed error; this module folds them into one root
//! type for the binary and for callers that drive the whole flow.

use thiserror::Error;

use crate::auction::ChainError;
use crate::proof::ProofError;
use crate::settlement::{SettlementError, SourceError};
use crate::sighash::SighashError;
use crate::signer::SignerError;

/// Root error type for the auction tooling
#[derive(Debug, Error)]
pub enum AuctionError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Signature hash errors
    #[error("sighash error: {0}")]
    Sighash(#[from] SighashError),

    /// Key handling and signing errors
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    /// Merkle proof and header chain errors
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    /// Transaction chain errors
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Settlement assembly errors
    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    /// Chain data source errors (network layer)
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Bad command line input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AuctionError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Only failures coming from the network layer are worth retrying;
    /// everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuctionError::Source(e) if e.is_transient())
    }

    /// Get a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuctionError::Config(_) => "CONFIG_ERROR",
            AuctionError::Logging(_) => "LOGGING_ERROR",
            AuctionError::Sighash(SighashError::InvalidScriptCode(_)) => "INVALID_SCRIPT_CODE",
            AuctionError::Sighash(_) => "SIGHASH_ERROR",
            AuctionError::Signer(SignerError::InvalidKeyMaterial(_)) => "INVALID_KEY_MATERIAL",
            AuctionError::Proof(ProofError::ProofMismatch { .. }) => "PROOF_MISMATCH",
            AuctionError::Proof(_) => "PROOF_ERROR",
            AuctionError::Chain(ChainError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            AuctionError::Chain(ChainError::SequenceDependencyUnresolved { .. }) => {
                "SEQUENCE_DEPENDENCY_UNRESOLVED"
            }
            AuctionError::Chain(_) => "CHAIN_ERROR",
            AuctionError::Settlement(SettlementError::SettlementEncodingFailed { .. }) => {
                "SETTLEMENT_ENCODING_FAILED"
            }
            AuctionError::Settlement(_) => "SETTLEMENT_ERROR",
            AuctionError::Source(_) => "SOURCE_ERROR",
            AuctionError::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }
}

/// Result type alias using AuctionError
pub type Result<T> = std::result::Result<T, AuctionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_taxonomy() {
        let err: AuctionError = ChainError::InsufficientFunds {
            required: 14_650,
            available: 14_649,
        }
        .into();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert!(err.to_string().contains("14650"));

        let err: AuctionError = SignerError::InvalidKeyMaterial("zero".into()).into();
        assert_eq!(err.error_code(), "INVALID_KEY_MATERIAL");

        let err: AuctionError = ChainError::SequenceDependencyUnresolved { step: 1 }.into();
        assert_eq!(err.error_code(), "SEQUENCE_DEPENDENCY_UNRESOLVED");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AuctionError::from(SourceError::Http("timeout".into())).is_retryable());
        assert!(!AuctionError::from(SourceError::Parse("bad hex".into())).is_retryable());
        assert!(!AuctionError::invalid_argument("missing txid").is_retryable());
    }
}
