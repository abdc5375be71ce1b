//! Integral Auction - Cross-Chain Dutch Auction Core
//!
//! Sells Bitcoin outputs through decaying-price offers that settle into an
//! Ethereum contract, with an on-chain path back for unsold slots.
//!
//! ## Components
//!
//! 1. **Sighash** - BIP143 digests with explicit script codes
//! 2. **Signer** - Deterministic low-s ECDSA and P2WPKH witnesses
//! 3. **Proof** - Merkle inclusion proofs and header chains
//! 4. **Auction** - Split, per-slot offers and the shutdown cascade
//! 5. **Settlement** - `open` / `claim` call assembly with per-item nonces
//!
//! The core is synchronous and holds no shared state; only the
//! [`settlement::ChainSource`] seam (implemented by [`EsploraClient`])
//! touches the network.

pub mod auction;
pub mod common;
pub mod esplora;
pub mod proof;
pub mod settlement;
pub mod sighash;
pub mod signer;
pub mod types;

// Re-exports: transaction chain
pub use auction::{
    AuctionChain, AuctionPhase, ChainBuilder, ChainError, ShutdownCascade, ShutdownStep, SignedTx,
    SlotOffers, SlotStatus, SplitTx,
};

// Re-exports: signing
pub use sighash::{
    digest, p2wpkh_script_code, ScriptCode, SighashContext, SighashError, SighashMode, SighashType,
};
pub use signer::{sign, sign_with_type, DigestSigner, KeyMaterial, SignerError, SingleKeySigner};

// Re-exports: SPV
pub use proof::{BlockHeader, HeaderChain, MerkleProof, ProofError};

// Re-exports: settlement
pub use settlement::{
    CallEncoder, CalldataEncoder, ChainSource, ClaimInput, OpenTerms, SettlementAssembler,
    SettlementCall, SettlementError, SourceError,
};

// Re-exports: Esplora client
pub use esplora::EsploraClient;

// Re-exports: shared
pub use common::{AuctionConfig, AuctionError, Result};
pub use types::{
    AuctionOffer, OfferParams, OfferSchedule, Prevout, ShutdownParams, SplitParams, UnsplitParams,
};
