//! Auction Transaction Builder
//!
//! Builds and signs the split, the per-slot dutch offers and the unsplit
//! recovery transaction. Every method returns fresh transactions; nothing
//! already signed is touched again.

use bitcoin::{
    absolute::LockTime, consensus, transaction::Version, Address, Amount, CompressedPublicKey,
    Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use tracing::debug;

use super::ChainError;
use crate::common::logging::log_chain_event;
use crate::sighash::{self, p2wpkh_script_code, SighashContext, SighashMode};
use crate::signer::DigestSigner;
use crate::types::{AuctionOffer, OfferParams, Prevout, SplitParams, UnsplitParams};

/// Sequence for the split, unsplit and shutdown inputs
pub const DEFAULT_SEQUENCE: Sequence = Sequence(0xFFFF_FFFE);

/// Sequence for offer inputs, leaving lock time enforced and RBF signalled
pub const OFFER_SEQUENCE: Sequence = Sequence(0xFFFF_FFFD);

/// A fully signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub tx: Transaction,
}

impl SignedTx {
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    /// Consensus serialization, witnesses included
    pub fn serialize(&self) -> Vec<u8> {
        consensus::serialize(&self.tx)
    }

    pub fn to_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.tx)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, consensus::encode::FromHexError> {
        consensus::encode::deserialize_hex(hex_str.trim()).map(|tx| Self { tx })
    }

    /// Sum of all output values
    pub fn value_out(&self) -> Amount {
        self.tx.output.iter().map(|o| o.value).sum()
    }
}

/// The split transaction and the slots it creates
#[derive(Debug, Clone)]
pub struct SplitTx {
    pub signed: SignedTx,
    pub slots: Vec<Prevout>,
    pub change: Amount,
}

/// One signed offer
#[derive(Debug, Clone)]
pub struct SignedOffer {
    pub offer: AuctionOffer,
    pub signed: SignedTx,
}

/// All offers for one slot; any one of them consumes the slot
#[derive(Debug, Clone)]
pub struct SlotOffers {
    pub slot: Prevout,
    pub offers: Vec<SignedOffer>,
}

impl SlotOffers {
    /// Offers serialized back to back, as passed to `open`
    pub fn partial_tx(&self) -> Vec<u8> {
        self.offers
            .iter()
            .flat_map(|o| o.signed.serialize())
            .collect()
    }

    pub fn partial_tx_hex(&self) -> String {
        hex::encode(self.partial_tx())
    }
}

/// Builds the auction transaction chain for one control key
pub struct ChainBuilder<'a, S: DigestSigner + ?Sized> {
    signer: &'a S,
    network: Network,
}

impl<'a, S: DigestSigner + ?Sized> ChainBuilder<'a, S> {
    pub fn new(signer: &'a S, network: Network) -> Self {
        Self { signer, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Key that owns the funding, slot and shutdown inputs
    pub fn control_key(&self) -> CompressedPublicKey {
        self.signer.public_key()
    }

    /// P2WPKH address of the control key
    pub fn control_address(&self) -> Address {
        Address::p2wpkh(&self.control_key(), self.network)
    }

    /// Split one funding output into `slot_count` equal slots plus change
    pub fn build_split(&self, params: &SplitParams) -> Result<SplitTx, ChainError> {
        if params.slot_count == 0 {
            return Err(ChainError::NoSlots);
        }

        let slots_total = params
            .slot_size
            .checked_mul(params.slot_count as u64)
            .ok_or(ChainError::AmountOverflow)?;
        let required = slots_total
            .checked_add(params.fee)
            .ok_or(ChainError::AmountOverflow)?;
        let change = params
            .funding
            .value
            .checked_sub(required)
            .ok_or(ChainError::InsufficientFunds {
                required: required.to_sat(),
                available: params.funding.value.to_sat(),
            })?;

        let control_script = self.control_address().script_pubkey();
        let mut output: Vec<TxOut> = (0..params.slot_count)
            .map(|_| TxOut {
                value: params.slot_size,
                script_pubkey: control_script.clone(),
            })
            .collect();
        output.push(TxOut {
            value: change,
            script_pubkey: params.change_address.script_pubkey(),
        });

        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![unsigned_input(params.funding.outpoint, DEFAULT_SEQUENCE)],
            output,
        };

        let signed = self.sign(
            unsigned,
            &[(params.funding.value, SighashMode::SINGLE_ANYONECANPAY)],
        )?;
        let txid = signed.txid();

        debug!(%txid, slots = params.slot_count, change = change.to_sat(), "split signed");
        log_chain_event("split", &txid.to_string(), signed.value_out().to_sat(), 1);

        let slots = (0..params.slot_count as u32)
            .map(|vout| Prevout::new(txid, vout, params.slot_size))
            .collect();

        Ok(SplitTx {
            signed,
            slots,
            change,
        })
    }

    /// Sign every schedule entry against every slot
    pub fn build_offers(&self, params: &OfferParams) -> Result<Vec<SlotOffers>, ChainError> {
        if params.slots.is_empty() {
            return Err(ChainError::NoSlots);
        }

        let recipient = params.recipient.script_pubkey();

        params
            .slots
            .iter()
            .map(|slot| {
                let offers = params
                    .schedule
                    .iter()
                    .map(|offer| self.build_offer(slot, offer, &recipient))
                    .collect::<Result<Vec<_>, _>>()?;

                debug!(
                    slot = %slot.outpoint,
                    offers = offers.len(),
                    "slot offers signed"
                );

                Ok(SlotOffers {
                    slot: *slot,
                    offers,
                })
            })
            .collect()
    }

    fn build_offer(
        &self,
        slot: &Prevout,
        offer: &AuctionOffer,
        recipient: &ScriptBuf,
    ) -> Result<SignedOffer, ChainError> {
        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: offer.lock_time,
            input: vec![unsigned_input(slot.outpoint, OFFER_SEQUENCE)],
            output: vec![TxOut {
                value: offer.price,
                script_pubkey: recipient.clone(),
            }],
        };

        let signed = self.sign(unsigned, &[(slot.value, SighashMode::SINGLE_ANYONECANPAY)])?;

        Ok(SignedOffer {
            offer: *offer,
            signed,
        })
    }

    /// Collapse an un-offered split back into one output
    pub fn build_unsplit(&self, params: &UnsplitParams) -> Result<SignedTx, ChainError> {
        if params.slot_count == 0 {
            return Err(ChainError::NoSlots);
        }

        let available = params
            .slot_size
            .checked_mul(params.slot_count as u64)
            .ok_or(ChainError::AmountOverflow)?;
        let value = available
            .checked_sub(params.fee)
            .ok_or(ChainError::InsufficientFunds {
                required: params.fee.to_sat(),
                available: available.to_sat(),
            })?;

        let input = (0..params.slot_count)
            .map(|vout| {
                unsigned_input(
                    OutPoint {
                        txid: params.split_txid,
                        vout,
                    },
                    DEFAULT_SEQUENCE,
                )
            })
            .collect();

        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output: vec![TxOut {
                value,
                script_pubkey: params.change_address.script_pubkey(),
            }],
        };

        let prevouts = vec![(params.slot_size, SighashMode::ALL); params.slot_count as usize];
        let signed = self.sign(unsigned, &prevouts)?;

        log_chain_event(
            "unsplit",
            &signed.txid().to_string(),
            value.to_sat(),
            params.slot_count as usize,
        );

        Ok(signed)
    }

    /// Sign every input of `unsigned` and return the completed transaction.
    ///
    /// `prevouts[i]` is the value spent by input `i` and the mode to sign it
    /// with. Segwit digests ignore witnesses, so all digests are taken from
    /// the unsigned transaction.
    pub(crate) fn sign(
        &self,
        unsigned: Transaction,
        prevouts: &[(Amount, SighashMode)],
    ) -> Result<SignedTx, ChainError> {
        let script_code = p2wpkh_script_code(&self.control_key());

        let witnesses = prevouts
            .iter()
            .enumerate()
            .map(|(index, &(value, mode))| {
                let ctx = SighashContext::new(index, script_code.clone(), value, mode);
                let digest = sighash::digest(&unsigned, &ctx)?;
                Ok(self.signer.p2wpkh_witness(&digest, mode)?)
            })
            .collect::<Result<Vec<Witness>, ChainError>>()?;

        let input = unsigned
            .input
            .into_iter()
            .zip(witnesses)
            .map(|(txin, witness)| TxIn { witness, ..txin })
            .collect();

        Ok(SignedTx {
            tx: Transaction { input, ..unsigned },
        })
    }
}

pub(crate) fn unsigned_input(previous_output: OutPoint, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::new(),
    }
}
