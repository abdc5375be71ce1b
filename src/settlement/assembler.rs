//! Settlement Assembler
//!
//! Turns won auctions into contract calls. Every item in a batch gets the
//! nonce `start + offset` from its position in the input, so calls can be
//! submitted in order no matter how the proofs were fetched. A failing item
//! is reported on its own and never aborts the batch.

use alloy_primitives::{Address as EthAddress, U256};
use bitcoin::{consensus, hashes::Hash, Transaction, Txid};
use futures_util::future::join_all;
use tracing::{debug, info};

use super::encoder::{CallEncoder, ClaimCall, EncodedCall, OpenCall};
use super::source::ChainSource;
use super::SettlementError;
use crate::auction::SlotOffers;
use crate::common::logging::log_settlement_event;
use crate::proof::{HeaderChain, MerkleProof};

/// Everything needed to claim one won slot
#[derive(Debug, Clone)]
pub struct ClaimInput {
    /// Winning transaction, consensus-serialized
    pub tx: Vec<u8>,
    pub proof: MerkleProof,
    /// Confirming block first
    pub headers: HeaderChain,
}

/// Terms shared by every `open` call of an auction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTerms {
    pub reserve_price: U256,
    pub req_difficulty: U256,
    pub asset: EthAddress,
    pub value: U256,
}

/// One assembled call, or why it could not be assembled
#[derive(Debug)]
pub struct SettlementCall {
    /// Position in the input batch
    pub index: usize,
    /// `None` when `start + index` does not fit in a nonce
    pub nonce: Option<u64>,
    pub result: Result<EncodedCall, SettlementError>,
}

impl SettlementCall {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Nonce for the item at `offset` in a batch starting at `start`
pub fn nonce_for(start: u64, offset: usize) -> Option<u64> {
    start.checked_add(u64::try_from(offset).ok()?)
}

/// Assembles batches of settlement calls through a [`CallEncoder`]
pub struct SettlementAssembler<E: CallEncoder> {
    encoder: E,
    /// Headers fetched after the confirming block
    header_count: u32,
}

impl<E: CallEncoder> SettlementAssembler<E> {
    pub fn new(encoder: E, header_count: u32) -> Self {
        Self {
            encoder,
            header_count,
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// One `claim` per input, in input order
    pub fn assemble_claims(&self, items: &[ClaimInput], start_nonce: u64) -> Vec<SettlementCall> {
        let calls: Vec<SettlementCall> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                assemble_item("claim", index, start_nonce, |nonce| {
                    self.claim_call(index, item, nonce)
                })
            })
            .collect();

        summarize("claim", &calls);
        calls
    }

    /// One `open` per slot, in slot order
    pub fn assemble_opens(
        &self,
        slots: &[SlotOffers],
        terms: &OpenTerms,
        start_nonce: u64,
    ) -> Vec<SettlementCall> {
        let calls: Vec<SettlementCall> = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                assemble_item("open", index, start_nonce, |nonce| {
                    let call = OpenCall {
                        partial_tx: slot.partial_tx(),
                        reserve_price: terms.reserve_price,
                        req_difficulty: terms.req_difficulty,
                        asset: terms.asset,
                        value: terms.value,
                    };
                    self.encoder.encode_open(&call, nonce).map_err(|e| {
                        SettlementError::SettlementEncodingFailed {
                            index,
                            reason: e.to_string(),
                        }
                    })
                })
            })
            .collect();

        summarize("open", &calls);
        calls
    }

    /// Fetch proofs for `txids` concurrently, then assemble claims in input
    /// order. Source errors end up in the failing item's result.
    pub async fn assemble_from_source<C: ChainSource + ?Sized>(
        &self,
        source: &C,
        txids: &[Txid],
        start_nonce: u64,
    ) -> Vec<SettlementCall> {
        let fetched = join_all(txids.iter().map(|txid| self.fetch_claim(source, txid))).await;

        let calls: Vec<SettlementCall> = fetched
            .into_iter()
            .enumerate()
            .map(|(index, fetched)| {
                assemble_item("claim", index, start_nonce, |nonce| match fetched {
                    Ok(item) => self.claim_call(index, &item, nonce),
                    Err(source) => Err(SettlementError::Source { index, source }),
                })
            })
            .collect();

        summarize("claim", &calls);
        calls
    }

    async fn fetch_claim<C: ChainSource + ?Sized>(
        &self,
        source: &C,
        txid: &Txid,
    ) -> Result<ClaimInput, super::SourceError> {
        let confirmed = source.fetch_transaction(txid).await?;
        let proof = source
            .fetch_merkle_proof(txid, confirmed.block_height)
            .await?;
        let window = self.header_count.saturating_add(1);
        let headers = source
            .fetch_header_chain(confirmed.block_height, window)
            .await?;

        debug!(%txid, height = confirmed.block_height, "claim data fetched");

        Ok(ClaimInput {
            tx: confirmed.raw,
            proof,
            headers,
        })
    }

    fn claim_call(
        &self,
        index: usize,
        item: &ClaimInput,
        nonce: u64,
    ) -> Result<EncodedCall, SettlementError> {
        let call = self.build_claim(index, item)?;
        self.encoder.encode_claim(&call, nonce).map_err(|e| {
            SettlementError::SettlementEncodingFailed {
                index,
                reason: e.to_string(),
            }
        })
    }

    fn build_claim(&self, index: usize, item: &ClaimInput) -> Result<ClaimCall, SettlementError> {
        item.proof
            .check()
            .map_err(|source| SettlementError::Proof { index, source })?;

        let tx: Transaction = consensus::deserialize(&item.tx).map_err(|e| {
            SettlementError::InvalidTransaction {
                index,
                reason: e.to_string(),
            }
        })?;
        if tx.compute_txid().to_byte_array() != item.proof.leaf {
            return Err(SettlementError::LeafMismatch { index });
        }

        if item.headers.merkle_root(0) != Some(item.proof.root) {
            return Err(SettlementError::RootNotInHeaders { index });
        }

        Ok(ClaimCall {
            tx: item.tx.clone(),
            proof: item.proof.to_blob(),
            index: item.proof.position,
            headers: item.headers.to_bytes(),
        })
    }
}

fn assemble_item<F>(call: &str, index: usize, start_nonce: u64, build: F) -> SettlementCall
where
    F: FnOnce(u64) -> Result<EncodedCall, SettlementError>,
{
    let nonce = nonce_for(start_nonce, index);
    let result = match nonce {
        Some(nonce) => build(nonce),
        None => Err(SettlementError::NonceOverflow { index }),
    };
    finish(call, index, nonce, result)
}

fn finish(
    call: &str,
    index: usize,
    nonce: Option<u64>,
    result: Result<EncodedCall, SettlementError>,
) -> SettlementCall {
    let error = result.as_ref().err().map(|e| e.to_string());
    log_settlement_event(call, index, nonce, result.is_ok(), error.as_deref());

    SettlementCall {
        index,
        nonce,
        result,
    }
}

fn summarize(call: &str, calls: &[SettlementCall]) {
    let ok = calls.iter().filter(|c| c.is_ok()).count();
    info!(call, total = calls.len(), ok, failed = calls.len() - ok, "settlement batch assembled");
}
