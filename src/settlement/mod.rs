//! Settlement Assembly
//!
//! Packages Bitcoin-side evidence into the auction contract's `open` and
//! `claim` calls.
//!
//! ```text
//! won txids ──► ChainSource (concurrent) ──► MerkleProof + HeaderChain
//!                                                   │
//!                      nonce = start + offset       ▼
//!                SettlementAssembler ──► CallEncoder ──► EncodedCall[]
//! ```

pub mod assembler;
pub mod encoder;
pub mod source;

use thiserror::Error;

use crate::proof::ProofError;

pub use assembler::{nonce_for, ClaimInput, OpenTerms, SettlementAssembler, SettlementCall};
pub use encoder::{CallEncoder, CalldataEncoder, ClaimCall, EncodeError, EncodedCall, OpenCall};
pub use source::{ChainSource, ConfirmedTx, SourceError};

/// Per-item settlement failures
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("item {index}: encoder rejected arguments: {reason}")]
    SettlementEncodingFailed { index: usize, reason: String },

    #[error("item {index}: {source}")]
    Proof {
        index: usize,
        #[source]
        source: ProofError,
    },

    #[error("item {index}: transaction does not match the proof leaf")]
    LeafMismatch { index: usize },

    #[error("item {index}: proof root is not committed by the first header")]
    RootNotInHeaders { index: usize },

    #[error("item {index}: invalid transaction: {reason}")]
    InvalidTransaction { index: usize, reason: String },

    #[error("item {index}: nonce overflows the batch start")]
    NonceOverflow { index: usize },

    #[error("item {index}: {source}")]
    Source {
        index: usize,
        #[source]
        source: SourceError,
    },
}

impl SettlementError {
    /// Batch position of the failing item
    pub fn index(&self) -> usize {
        match self {
            SettlementError::SettlementEncodingFailed { index, .. }
            | SettlementError::Proof { index, .. }
            | SettlementError::LeafMismatch { index }
            | SettlementError::RootNotInHeaders { index }
            | SettlementError::InvalidTransaction { index, .. }
            | SettlementError::NonceOverflow { index }
            | SettlementError::Source { index, .. } => *index,
        }
    }
}
