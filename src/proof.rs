//! Bitcoin SPV Proofs
//!
//! Merkle inclusion proofs and header chains linking a Bitcoin transaction
//! to the work committed in its block. These are what the settlement
//! contract checks before releasing the auctioned asset.
//!
//! # Proof blob
//!
//! ```text
//! leaf (32) | sibling_1 (32) | ... | sibling_k (32) | root (32)
//! ```
//!
//! All hashes are in internal byte order. The leaf position is carried
//! separately and is **1-indexed**.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::common::logging::log_proof_event;

/// Size of a serialized block header
pub const HEADER_SIZE: usize = 80;

/// Proof-related errors
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof mismatch: computed root {computed}, claimed root {claimed}")]
    ProofMismatch { computed: String, claimed: String },
    #[error("invalid proof length: {0} bytes")]
    InvalidLength(usize),
    #[error("leaf position must be 1-indexed, got {0}")]
    InvalidPosition(u32),
    #[error("leaf {index} out of range for {leaves} leaves")]
    LeafOutOfRange { index: usize, leaves: usize },
    #[error("invalid header chain length: {0} bytes")]
    InvalidHeaderChain(usize),
    #[error("header {index} does not build on its predecessor")]
    BrokenHeaderChain { index: usize },
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Bitcoin block header (80 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize to raw 80-byte format (little-endian)
    pub fn to_raw(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];

        raw[0..4].copy_from_slice(&self.version.to_le_bytes());
        raw[4..36].copy_from_slice(&self.prev_block_hash);
        raw[36..68].copy_from_slice(&self.merkle_root);
        raw[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        raw[72..76].copy_from_slice(&self.bits.to_le_bytes());
        raw[76..80].copy_from_slice(&self.nonce.to_le_bytes());

        raw
    }

    /// Parse from raw 80-byte format
    pub fn from_raw(raw: &[u8; HEADER_SIZE]) -> Self {
        Self {
            version: i32::from_le_bytes(le_word(raw, 0)),
            prev_block_hash: hash_at(raw, 4),
            merkle_root: hash_at(raw, 36),
            timestamp: u32::from_le_bytes(le_word(raw, 68)),
            bits: u32::from_le_bytes(le_word(raw, 72)),
            nonce: u32::from_le_bytes(le_word(raw, 76)),
        }
    }

    /// Block hash in internal byte order
    pub fn block_hash(&self) -> [u8; 32] {
        double_sha256(&self.to_raw())
    }
}

fn le_word(raw: &[u8], at: usize) -> [u8; 4] {
    let mut word = [0u8; 4];
    word.copy_from_slice(&raw[at..at + 4]);
    word
}

fn hash_at(raw: &[u8], at: usize) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&raw[at..at + 32]);
    hash
}

/// Headers proving accumulated work, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderChain {
    headers: Vec<BlockHeader>,
}

impl HeaderChain {
    pub fn new(headers: Vec<BlockHeader>) -> Self {
        Self { headers }
    }

    /// Parse concatenated raw headers
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.is_empty() || bytes.len() % HEADER_SIZE != 0 {
            return Err(ProofError::InvalidHeaderChain(bytes.len()));
        }

        let headers = bytes
            .chunks_exact(HEADER_SIZE)
            .map(|chunk| {
                let mut raw = [0u8; HEADER_SIZE];
                raw.copy_from_slice(chunk);
                BlockHeader::from_raw(&raw)
            })
            .collect();

        Ok(Self { headers })
    }

    /// Parse the hex blob form
    pub fn from_hex(hex_str: &str) -> Result<Self, ProofError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ProofError::ParseError(format!("invalid header chain hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn push(&mut self, header: BlockHeader) {
        self.headers.push(header);
    }

    pub fn headers(&self) -> &[BlockHeader] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Merkle root committed by the header at `index`
    pub fn merkle_root(&self, index: usize) -> Option<[u8; 32]> {
        self.headers.get(index).map(|h| h.merkle_root)
    }

    /// Concatenated raw headers
    pub fn to_bytes(&self) -> Vec<u8> {
        self.headers.iter().flat_map(|h| h.to_raw()).collect()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Check that every header commits to the hash of the one before it
    pub fn verify_links(&self) -> Result<(), ProofError> {
        for (index, pair) in self.headers.windows(2).enumerate() {
            if pair[1].prev_block_hash != pair[0].block_hash() {
                return Err(ProofError::BrokenHeaderChain { index: index + 1 });
            }
        }
        Ok(())
    }
}

/// Transaction Merkle proof for SPV verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Transaction ID (internal byte order)
    pub leaf: [u8; 32],
    /// Merkle proof siblings (from leaf to root)
    pub siblings: Vec<[u8; 32]>,
    /// Merkle root of the block
    pub root: [u8; 32],
    /// 1-indexed leaf position
    pub position: u32,
}

impl MerkleProof {
    /// Assemble a proof without hashing anything
    pub fn build(leaf: [u8; 32], siblings: Vec<[u8; 32]>, root: [u8; 32], position: u32) -> Self {
        Self {
            leaf,
            siblings,
            root,
            position,
        }
    }

    /// Recompute the root from the leaf, siblings and position
    pub fn computed_root(&self) -> [u8; 32] {
        let mut current = self.leaf;
        let mut index = self.position;

        for sibling in &self.siblings {
            if index % 2 == 0 {
                // Even: the sibling sits to the left
                current = double_sha256_pair(sibling, &current);
                index /= 2;
            } else {
                current = double_sha256_pair(&current, sibling);
                index = index / 2 + 1;
            }
        }

        current
    }

    /// Verify the proof against its own root
    pub fn verify(&self) -> bool {
        let valid = self.computed_root() == self.root;
        log_proof_event(
            &hex::encode(self.leaf),
            self.position,
            self.siblings.len(),
            valid,
        );
        valid
    }

    /// Like [`MerkleProof::verify`], but reports the mismatch
    pub fn check(&self) -> Result<(), ProofError> {
        let computed = self.computed_root();
        if computed == self.root {
            Ok(())
        } else {
            log_proof_event(
                &hex::encode(self.leaf),
                self.position,
                self.siblings.len(),
                false,
            );
            Err(ProofError::ProofMismatch {
                computed: hex::encode(computed),
                claimed: hex::encode(self.root),
            })
        }
    }

    /// Serialize to the `leaf | siblings | root` blob
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(32 * (self.siblings.len() + 2));
        blob.extend_from_slice(&self.leaf);
        for sibling in &self.siblings {
            blob.extend_from_slice(sibling);
        }
        blob.extend_from_slice(&self.root);
        blob
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_blob())
    }

    /// Parse a blob; `position` is 1-indexed
    pub fn from_blob(blob: &[u8], position: u32) -> Result<Self, ProofError> {
        if blob.len() < 64 || blob.len() % 32 != 0 {
            return Err(ProofError::InvalidLength(blob.len()));
        }
        if position == 0 {
            return Err(ProofError::InvalidPosition(position));
        }

        let hashes: Vec<[u8; 32]> = blob.chunks_exact(32).map(|c| hash_at(c, 0)).collect();
        let last = hashes.len() - 1;

        Ok(Self {
            leaf: hashes[0],
            siblings: hashes[1..last].to_vec(),
            root: hashes[last],
            position,
        })
    }

    pub fn from_hex(hex_str: &str, position: u32) -> Result<Self, ProofError> {
        let blob = hex::decode(hex_str.trim())
            .map_err(|e| ProofError::ParseError(format!("invalid proof hex: {}", e)))?;
        Self::from_blob(&blob, position)
    }

    /// Convert an Electrum/Esplora merkle path into a proof.
    ///
    /// `txid` and `merkle` are display-order hex; `pos` is the 0-indexed
    /// position the server reports; `root` is in internal byte order, as
    /// found at bytes 36..68 of the block header.
    pub fn from_electrum(
        txid: &str,
        merkle: &[String],
        pos: u32,
        root: [u8; 32],
    ) -> Result<Self, ProofError> {
        let leaf = txid_to_bytes(txid)?;
        let siblings = merkle
            .iter()
            .map(|h| txid_to_bytes(h))
            .collect::<Result<Vec<_>, _>>()?;

        // Server positions are 0-indexed, ours are 1-indexed
        let position = pos
            .checked_add(1)
            .ok_or(ProofError::InvalidPosition(pos))?;

        Ok(Self::build(leaf, siblings, root, position))
    }

    /// Build a proof for `leaves[index]` from the full list of block txids.
    ///
    /// Odd levels duplicate their last node, as Bitcoin does.
    pub fn from_block_txids(leaves: &[[u8; 32]], index: usize) -> Result<Self, ProofError> {
        if index >= leaves.len() {
            return Err(ProofError::LeafOutOfRange {
                index,
                leaves: leaves.len(),
            });
        }
        let position =
            u32::try_from(index + 1).map_err(|_| ProofError::ParseError("tree too large".into()))?;

        let mut level = leaves.to_vec();
        let mut idx = index;
        let mut siblings = Vec::new();

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = level[level.len() - 1];
                level.push(last);
            }
            siblings.push(level[idx ^ 1]);
            level = level
                .chunks_exact(2)
                .map(|pair| double_sha256_pair(&pair[0], &pair[1]))
                .collect();
            idx /= 2;
        }

        Ok(Self::build(leaves[index], siblings, level[0], position))
    }
}

/// Double SHA256 hash (Bitcoin standard)
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Double SHA256 hash of two 32-byte values concatenated
fn double_sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[0..32].copy_from_slice(left);
    combined[32..64].copy_from_slice(right);
    double_sha256(&combined)
}

/// Convert a display-order txid (hex) to internal bytes
pub fn txid_to_bytes(txid: &str) -> Result<[u8; 32], ProofError> {
    let bytes = hex::decode(txid.trim())
        .map_err(|e| ProofError::ParseError(format!("invalid txid hex: {}", e)))?;

    if bytes.len() != 32 {
        return Err(ProofError::ParseError(format!(
            "invalid txid length: {}",
            bytes.len()
        )));
    }

    let mut result = hash_at(&bytes, 0);
    result.reverse();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
    const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
    const GENESIS_COINBASE: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn leaves(count: usize) -> Vec<[u8; 32]> {
        (0..count)
            .map(|i| double_sha256(&(i as u64).to_le_bytes()))
            .collect()
    }

    #[test]
    fn test_double_sha256() {
        assert_eq!(
            hex::encode(double_sha256(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn test_genesis_header() {
        let chain = HeaderChain::from_hex(GENESIS_HEADER).unwrap();
        assert_eq!(chain.len(), 1);

        let header = chain.headers()[0];
        assert_eq!(header.version, 1);
        assert_eq!(header.bits, 0x1d00ffff);

        let mut hash = header.block_hash();
        hash.reverse();
        assert_eq!(hex::encode(hash), GENESIS_HASH);
        assert_eq!(chain.to_hex(), GENESIS_HEADER);

        // Single-transaction block: the root is the coinbase txid
        let coinbase = txid_to_bytes(GENESIS_COINBASE).unwrap();
        assert_eq!(chain.merkle_root(0), Some(coinbase));
        let proof = MerkleProof::from_block_txids(&[coinbase], 0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn test_header_chain_links() {
        let first = BlockHeader::from_raw(
            &hex::decode(GENESIS_HEADER).unwrap().try_into().unwrap(),
        );
        let second = BlockHeader {
            prev_block_hash: first.block_hash(),
            nonce: 7,
            ..first
        };
        let third = BlockHeader {
            prev_block_hash: second.block_hash(),
            nonce: 8,
            ..first
        };

        let chain = HeaderChain::new(vec![first, second, third]);
        assert!(chain.verify_links().is_ok());
        assert_eq!(chain.to_bytes().len(), 3 * HEADER_SIZE);

        let broken = HeaderChain::new(vec![first, third]);
        assert!(matches!(
            broken.verify_links(),
            Err(ProofError::BrokenHeaderChain { index: 1 })
        ));
    }

    #[test]
    fn test_header_chain_rejects_partial_headers() {
        assert!(matches!(
            HeaderChain::from_bytes(&[0u8; 81]),
            Err(ProofError::InvalidHeaderChain(81))
        ));
        assert!(HeaderChain::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_odd_tree_duplicates_last_leaf() {
        let txids = leaves(3);
        for index in 0..3 {
            let proof = MerkleProof::from_block_txids(&txids, index).unwrap();
            assert_eq!(proof.position, index as u32 + 1);
            assert!(proof.verify(), "leaf {} should verify", index);
        }

        // The lone third leaf is paired with itself
        let proof = MerkleProof::from_block_txids(&txids, 2).unwrap();
        assert_eq!(proof.siblings[0], txids[2]);
    }

    #[test]
    fn test_blob_layout() {
        let txids = leaves(4);
        let proof = MerkleProof::from_block_txids(&txids, 2).unwrap();
        let blob = proof.to_blob();

        assert_eq!(blob.len(), 32 * 4);
        assert_eq!(&blob[..32], &txids[2]);
        assert_eq!(&blob[32..64], &txids[3]);
        assert_eq!(&blob[96..], &proof.root);

        let parsed = MerkleProof::from_hex(&proof.to_hex(), 3).unwrap();
        assert_eq!(parsed, proof);
    }

    #[test]
    fn test_blob_validation() {
        assert!(matches!(
            MerkleProof::from_blob(&[0u8; 32], 1),
            Err(ProofError::InvalidLength(32))
        ));
        assert!(matches!(
            MerkleProof::from_blob(&[0u8; 70], 1),
            Err(ProofError::InvalidLength(70))
        ));
        assert!(matches!(
            MerkleProof::from_blob(&[0u8; 64], 0),
            Err(ProofError::InvalidPosition(0))
        ));
    }

    #[test]
    fn test_electrum_positions_are_shifted() {
        let txids = leaves(4);
        let expected = MerkleProof::from_block_txids(&txids, 1).unwrap();

        let display = |h: &[u8; 32]| {
            let mut h = *h;
            h.reverse();
            hex::encode(h)
        };
        let merkle: Vec<String> = expected.siblings.iter().map(display).collect();

        let proof =
            MerkleProof::from_electrum(&display(&txids[1]), &merkle, 1, expected.root).unwrap();
        assert_eq!(proof.position, 2);
        assert_eq!(proof, expected);
        assert!(proof.check().is_ok());
    }

    #[test]
    fn test_check_reports_mismatch() {
        let txids = leaves(2);
        let mut proof = MerkleProof::from_block_txids(&txids, 0).unwrap();
        proof.position = 2;

        assert!(!proof.verify());
        assert!(matches!(
            proof.check(),
            Err(ProofError::ProofMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn test_every_position_verifies(depth in 0u32..6, seed in any::<u64>()) {
            let count = 1usize << depth;
            let txids: Vec<[u8; 32]> = (0..count)
                .map(|i| double_sha256(&[seed.to_le_bytes(), (i as u64).to_le_bytes()].concat()))
                .collect();

            for index in 0..count {
                let proof = MerkleProof::from_block_txids(&txids, index).unwrap();
                let rebuilt = MerkleProof::build(
                    proof.leaf,
                    proof.siblings.clone(),
                    proof.root,
                    index as u32 + 1,
                );
                prop_assert!(rebuilt.verify());
            }
        }

        #[test]
        fn test_flipped_sibling_byte_fails(
            depth in 1u32..6,
            leaf_pick in any::<prop::sample::Index>(),
            sibling_pick in any::<prop::sample::Index>(),
            byte in 0usize..32,
            flip in 1u8..=255,
        ) {
            let count = 1usize << depth;
            let txids = leaves(count);
            let index = leaf_pick.index(count);

            let mut proof = MerkleProof::from_block_txids(&txids, index).unwrap();
            let sibling = sibling_pick.index(proof.siblings.len());
            proof.siblings[sibling][byte] ^= flip;

            prop_assert!(!proof.verify());
        }
    }
}
