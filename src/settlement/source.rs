//! Chain Data Source
//!
//! What settlement needs from a Bitcoin backend: confirmed transactions,
//! their Merkle paths, header runs, and broadcast. Implementations own
//! their connection, retries and timeouts.

use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use thiserror::Error;

use crate::proof::{HeaderChain, MerkleProof};

/// A transaction together with the block that confirmed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTx {
    pub txid: Txid,
    /// Consensus serialization, witnesses included
    pub raw: Vec<u8>,
    pub block_height: u32,
}

/// Network layer errors, passed through untouched
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction {0} not confirmed")]
    NotConfirmed(Txid),

    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Worth asking again later
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Http(_) | SourceError::NotConfirmed(_))
    }
}

/// Bitcoin data backend used during settlement
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Raw transaction and confirming height
    async fn fetch_transaction(&self, txid: &Txid) -> Result<ConfirmedTx, SourceError>;

    /// Merkle proof for `txid` in the block at `block_height`
    async fn fetch_merkle_proof(
        &self,
        txid: &Txid,
        block_height: u32,
    ) -> Result<MerkleProof, SourceError>;

    /// `count` consecutive headers starting at `start_height`
    async fn fetch_header_chain(
        &self,
        start_height: u32,
        count: u32,
    ) -> Result<HeaderChain, SourceError>;

    /// Submit a signed transaction
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SourceError>;
}
