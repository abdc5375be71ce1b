//! Esplora Chain Source
//!
//! [`ChainSource`] over the Esplora REST API (Blockstream, mempool.space or
//! a local electrs). Each call is a plain request/response; callers decide
//! about retries.

use async_trait::async_trait;
use bitcoin::{consensus, Transaction, Txid};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::proof::{BlockHeader, HeaderChain, MerkleProof, HEADER_SIZE};
use crate::settlement::{ChainSource, ConfirmedTx, SourceError};

/// Esplora API endpoints
pub const MAINNET_URL: &str = "https://blockstream.info/api";
pub const TESTNET_URL: &str = "https://blockstream.info/testnet/api";

/// Esplora HTTP client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client for Bitcoin mainnet
    pub fn new_mainnet() -> Self {
        Self::new(MAINNET_URL)
    }

    /// Create a client for Bitcoin testnet
    pub fn new_testnet() -> Self {
        Self::new(TESTNET_URL)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get current block height
    pub async fn get_tip_height(&self) -> Result<u32, SourceError> {
        let text = self.get_text(&format!("{}/blocks/tip/height", self.base_url)).await?;
        text.trim()
            .parse()
            .map_err(|e| SourceError::Parse(format!("invalid height: {}", e)))
    }

    /// Get block header by height
    pub async fn get_block_header(&self, height: u32) -> Result<BlockHeader, SourceError> {
        let block_hash = self
            .get_text(&format!("{}/block-height/{}", self.base_url, height))
            .await?;

        let header_hex = self
            .get_text(&format!("{}/block/{}/header", self.base_url, block_hash.trim()))
            .await?;
        parse_header(&header_hex)
    }

    async fn get_tx_status(&self, txid: &Txid) -> Result<EsploraTxStatus, SourceError> {
        let url = format!("{}/tx/{}/status", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::NotFound(txid.to_string()));
        }
        Ok(resp.json().await?)
    }

    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::NotFound(url.to_string()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ChainSource for EsploraClient {
    async fn fetch_transaction(&self, txid: &Txid) -> Result<ConfirmedTx, SourceError> {
        let status = self.get_tx_status(txid).await?;
        let block_height = match (status.confirmed, status.block_height) {
            (true, Some(height)) => height,
            _ => return Err(SourceError::NotConfirmed(*txid)),
        };

        let url = format!("{}/tx/{}/raw", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::NotFound(txid.to_string()));
        }
        let raw = resp.bytes().await?.to_vec();

        debug!(%txid, block_height, bytes = raw.len(), "transaction fetched");

        Ok(ConfirmedTx {
            txid: *txid,
            raw,
            block_height,
        })
    }

    async fn fetch_merkle_proof(
        &self,
        txid: &Txid,
        block_height: u32,
    ) -> Result<MerkleProof, SourceError> {
        let url = format!("{}/tx/{}/merkle-proof", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::NotFound(txid.to_string()));
        }
        let path: EsploraMerkleProof = resp.json().await?;

        if path.block_height != block_height {
            return Err(SourceError::Parse(format!(
                "merkle proof is for block {}, expected {}",
                path.block_height, block_height
            )));
        }

        let header = self.get_block_header(block_height).await?;
        path.into_proof(txid, header.merkle_root)
    }

    async fn fetch_header_chain(
        &self,
        start_height: u32,
        count: u32,
    ) -> Result<HeaderChain, SourceError> {
        let mut chain = HeaderChain::default();
        for height in start_height..start_height.saturating_add(count) {
            chain.push(self.get_block_header(height).await?);
        }

        debug!(start_height, count, "header chain fetched");
        Ok(chain)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SourceError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .body(consensus::encode::serialize_hex(tx))
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(SourceError::Http(format!("broadcast rejected: {}", error_text)));
        }

        let txid = resp.text().await?;
        txid.trim()
            .parse()
            .map_err(|e| SourceError::Parse(format!("invalid txid {}: {}", txid, e)))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

fn parse_header(header_hex: &str) -> Result<BlockHeader, SourceError> {
    let bytes = hex::decode(header_hex.trim())
        .map_err(|e| SourceError::Parse(format!("invalid header hex: {}", e)))?;
    let raw: [u8; HEADER_SIZE] = bytes.as_slice().try_into().map_err(|_| {
        SourceError::Parse(format!("invalid header length: {} bytes", bytes.len()))
    })?;
    Ok(BlockHeader::from_raw(&raw))
}

/// Transaction status
#[derive(Debug, Clone, Deserialize)]
struct EsploraTxStatus {
    confirmed: bool,
    block_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EsploraMerkleProof {
    block_height: u32,
    merkle: Vec<String>,
    pos: u32,
}

impl EsploraMerkleProof {
    fn into_proof(self, txid: &Txid, root: [u8; 32]) -> Result<MerkleProof, SourceError> {
        MerkleProof::from_electrum(&txid.to_string(), &self.merkle, self.pos, root)
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    #[test]
    fn test_client_urls() {
        let mainnet = EsploraClient::new_mainnet();
        assert_eq!(mainnet.base_url(), MAINNET_URL);

        let local = EsploraClient::new("http://127.0.0.1:3002/");
        assert_eq!(local.base_url(), "http://127.0.0.1:3002");
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header(&format!("{}\n", GENESIS_HEADER)).unwrap();
        assert_eq!(header.nonce, 2_083_236_893);
        assert!(matches!(parse_header("00ff"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_merkle_proof_response() {
        // Two-leaf block, our tx is the second leaf
        let sibling = [0x11u8; 32];
        let leaf = [0x22u8; 32];
        let proof = MerkleProof::from_block_txids(&[sibling, leaf], 1).unwrap();

        let mut display = sibling;
        display.reverse();
        let body = format!(
            r#"{{"block_height": 100, "merkle": ["{}"], "pos": 1}}"#,
            hex::encode(display)
        );
        let path: EsploraMerkleProof = serde_json::from_str(&body).unwrap();

        let txid = Txid::from_byte_array(leaf);
        let parsed = path.into_proof(&txid, proof.root).unwrap();
        assert_eq!(parsed.position, 2);
        assert_eq!(parsed, proof);
        assert!(parsed.verify());
    }

    #[test]
    fn test_tx_status_response() {
        let status: EsploraTxStatus =
            serde_json::from_str(r#"{"confirmed": false}"#).unwrap();
        assert!(!status.confirmed);
        assert!(status.block_height.is_none());
    }
}
