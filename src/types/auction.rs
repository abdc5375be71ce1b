//! Auction Types
//!
//! Parameter objects for each step of the transaction chain. Every builder
//! operation takes one of these instead of loose arguments.

use std::str::FromStr;

use alloy_primitives::Address as EthAddress;
use bitcoin::{absolute::LockTime, Address, Amount, OutPoint, Txid};

use crate::auction::ChainError;

/// An output to be spent, with the value it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prevout {
    pub outpoint: OutPoint,
    pub value: Amount,
}

impl Prevout {
    pub fn new(txid: Txid, vout: u32, value: Amount) -> Self {
        Self {
            outpoint: OutPoint { txid, vout },
            value,
        }
    }
}

/// One price point of a dutch auction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionOffer {
    /// Price paid to the seller
    pub price: Amount,
    /// Lock time of the offer transaction (height or timestamp)
    pub lock_time: LockTime,
}

impl AuctionOffer {
    /// Build from raw satoshi price and consensus lock time
    pub fn new(price_sats: u64, lock_time: u32) -> Self {
        Self {
            price: Amount::from_sat(price_sats),
            lock_time: LockTime::from_consensus(lock_time),
        }
    }
}

/// Parses `price:locktime`, e.g. `1000:144`
impl FromStr for AuctionOffer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (price, lock_time) = s
            .split_once(':')
            .ok_or_else(|| format!("expected price:locktime, got {}", s))?;
        let price: u64 = price
            .trim()
            .parse()
            .map_err(|e| format!("invalid price {}: {}", price, e))?;
        let lock_time: u32 = lock_time
            .trim()
            .parse()
            .map_err(|e| format!("invalid locktime {}: {}", lock_time, e))?;
        Ok(Self::new(price, lock_time))
    }
}

/// Ordered offers applied identically to every slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSchedule(Vec<AuctionOffer>);

impl OfferSchedule {
    /// Validate and wrap a schedule: non-empty, every price positive
    pub fn new(offers: Vec<AuctionOffer>) -> Result<Self, ChainError> {
        if offers.is_empty() {
            return Err(ChainError::EmptySchedule);
        }

        if let Some(index) = offers.iter().position(|o| o.price == Amount::ZERO) {
            return Err(ChainError::ZeroPrice { index });
        }

        Ok(Self(offers))
    }

    /// Build from `(price_sats, lock_time)` pairs
    pub fn from_pairs(pairs: &[(u64, u32)]) -> Result<Self, ChainError> {
        Self::new(
            pairs
                .iter()
                .map(|&(price, lock_time)| AuctionOffer::new(price, lock_time))
                .collect(),
        )
    }

    pub fn offers(&self) -> &[AuctionOffer] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuctionOffer> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameters for the split transaction
#[derive(Debug, Clone)]
pub struct SplitParams {
    /// Confirmed output funding the whole auction set
    pub funding: Prevout,
    /// Number of auction slots to create
    pub slot_count: usize,
    /// Value of each slot output
    pub slot_size: Amount,
    /// Fee paid by the split
    pub fee: Amount,
    /// Receives `funding - slots - fee`
    pub change_address: Address,
}

/// Parameters for the per-slot dutch offers
#[derive(Debug, Clone)]
pub struct OfferParams {
    /// Slot outputs created by the split
    pub slots: Vec<Prevout>,
    /// Receives the auction proceeds
    pub recipient: Address,
    /// Shared price schedule
    pub schedule: OfferSchedule,
}

/// Parameters for the shutdown cascade
#[derive(Debug, Clone)]
pub struct ShutdownParams {
    /// Split transaction holding the slots
    pub split_txid: Txid,
    /// Unsold slot indexes, in reclaim order
    pub unsold: Vec<u32>,
    /// Value of each slot output
    pub slot_size: Amount,
    /// Output funding the first step
    pub funding: Prevout,
    /// Fee paid by every step
    pub fee: Amount,
    /// Receives the final step's output
    pub change_address: Address,
    /// Destination-chain address embedded in the final step
    pub settlement_address: EthAddress,
}

/// Parameters for collapsing an un-offered split
#[derive(Debug, Clone)]
pub struct UnsplitParams {
    /// Split transaction holding the slots
    pub split_txid: Txid,
    /// Number of slot outputs (indexes `0..slot_count`)
    pub slot_count: u32,
    /// Value of each slot output
    pub slot_size: Amount,
    /// Fee paid by the unsplit transaction
    pub fee: Amount,
    /// Receives everything that is left
    pub change_address: Address,
}
