//! Auction Lifecycle
//!
//! Tracks one auction set from funding to settlement and refuses
//! transitions that would sign something out of order.

use alloy_primitives::Address as EthAddress;
use bitcoin::{Address, Amount, CompressedPublicKey, Txid};
use serde::Serialize;
use tracing::info;

use super::builder::{ChainBuilder, SlotOffers, SplitTx};
use super::shutdown::{ShutdownCascade, ShutdownStep};
use super::ChainError;
use crate::signer::DigestSigner;
use crate::types::{OfferParams, OfferSchedule, Prevout, ShutdownParams, SplitParams};

/// Phase of the whole auction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionPhase {
    Unfunded,
    Split,
    Offered,
    Settled,
}

/// State of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Created by the split, no offers yet
    Open,
    /// Offers signed and published
    Offered,
    /// Consumed by a winning bid
    Claimed,
    /// Folded into the shutdown cascade
    Reclaimed,
}

/// Lifecycle of N slots sharing one control key and offer schedule
#[derive(Debug, Clone)]
pub struct AuctionChain {
    control_key: CompressedPublicKey,
    schedule: OfferSchedule,
    phase: AuctionPhase,
    split_txid: Option<Txid>,
    slots: Vec<Prevout>,
    status: Vec<SlotStatus>,
}

impl AuctionChain {
    pub fn new(control_key: CompressedPublicKey, schedule: OfferSchedule) -> Self {
        Self {
            control_key,
            schedule,
            phase: AuctionPhase::Unfunded,
            split_txid: None,
            slots: Vec::new(),
            status: Vec::new(),
        }
    }

    pub fn phase(&self) -> AuctionPhase {
        self.phase
    }

    pub fn slots(&self) -> &[Prevout] {
        &self.slots
    }

    pub fn slot_status(&self, index: usize) -> Option<SlotStatus> {
        self.status.get(index).copied()
    }

    pub fn split_txid(&self) -> Option<Txid> {
        self.split_txid
    }

    /// Slot indexes still on offer, in slot order
    pub fn unsold(&self) -> Vec<u32> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SlotStatus::Offered)
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Unfunded → Split
    pub fn split<S: DigestSigner + ?Sized>(
        &mut self,
        builder: &ChainBuilder<'_, S>,
        params: &SplitParams,
    ) -> Result<SplitTx, ChainError> {
        self.expect_phase(AuctionPhase::Unfunded, "split")?;
        self.check_key(builder)?;

        let split = builder.build_split(params)?;
        self.split_txid = Some(split.signed.txid());
        self.slots = split.slots.clone();
        self.status = vec![SlotStatus::Open; self.slots.len()];
        self.phase = AuctionPhase::Split;

        Ok(split)
    }

    /// Split → Offered
    pub fn offer<S: DigestSigner + ?Sized>(
        &mut self,
        builder: &ChainBuilder<'_, S>,
        recipient: Address,
    ) -> Result<Vec<SlotOffers>, ChainError> {
        self.expect_phase(AuctionPhase::Split, "offer")?;
        self.check_key(builder)?;

        let offers = builder.build_offers(&OfferParams {
            slots: self.slots.clone(),
            recipient,
            schedule: self.schedule.clone(),
        })?;

        self.status.fill(SlotStatus::Offered);
        self.phase = AuctionPhase::Offered;
        info!(slots = self.slots.len(), offers = self.schedule.len(), "auction offered");

        Ok(offers)
    }

    /// Record a winning bid observed on chain
    pub fn mark_claimed(&mut self, index: usize) -> Result<(), ChainError> {
        self.expect_phase(AuctionPhase::Offered, "claim")?;

        let slots = self.status.len();
        let status = self
            .status
            .get_mut(index)
            .ok_or(ChainError::SlotOutOfRange { index, slots })?;
        if *status != SlotStatus::Offered {
            return Err(ChainError::InvalidTransition {
                from: self.phase,
                action: "claim",
            });
        }

        *status = SlotStatus::Claimed;
        self.settle_if_resolved();
        Ok(())
    }

    /// Offered → Settled, folding every unsold slot into the shutdown
    /// cascade. Nothing changes unless the whole cascade builds.
    pub fn reclaim<S: DigestSigner + ?Sized>(
        &mut self,
        builder: &ChainBuilder<'_, S>,
        funding: Prevout,
        fee: Amount,
        change_address: Address,
        settlement_address: EthAddress,
    ) -> Result<Vec<ShutdownStep>, ChainError> {
        self.expect_phase(AuctionPhase::Offered, "reclaim")?;
        self.check_key(builder)?;

        let split_txid = self.split_txid.ok_or(ChainError::InvalidTransition {
            from: self.phase,
            action: "reclaim",
        })?;
        let slot_size = self.slots.first().map(|s| s.value).ok_or(ChainError::NoSlots)?;

        let mut cascade = ShutdownCascade::new(ShutdownParams {
            split_txid,
            unsold: self.unsold(),
            slot_size,
            funding,
            fee,
            change_address,
            settlement_address,
        })?;

        let steps = cascade.build_all(builder)?;

        for step in &steps {
            if let Some(status) = self.status.get_mut(step.slot.outpoint.vout as usize) {
                *status = SlotStatus::Reclaimed;
            }
        }
        self.settle_if_resolved();

        Ok(steps)
    }

    fn settle_if_resolved(&mut self) {
        let resolved = self
            .status
            .iter()
            .all(|s| matches!(s, SlotStatus::Claimed | SlotStatus::Reclaimed));
        if resolved {
            self.phase = AuctionPhase::Settled;
        }
    }

    fn expect_phase(&self, phase: AuctionPhase, action: &'static str) -> Result<(), ChainError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(ChainError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }

    fn check_key<S: DigestSigner + ?Sized>(
        &self,
        builder: &ChainBuilder<'_, S>,
    ) -> Result<(), ChainError> {
        if builder.control_key() == self.control_key {
            Ok(())
        } else {
            Err(ChainError::ControlKeyMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::builder::tests::{change_address, control_signer};
    use crate::signer::SingleKeySigner;
    use bitcoin::{hashes::Hash, Network};

    fn chain() -> AuctionChain {
        AuctionChain::new(
            control_signer().public_key(),
            OfferSchedule::from_pairs(&[(1000, 0), (900, 144)]).unwrap(),
        )
    }

    fn split_params() -> SplitParams {
        SplitParams {
            funding: Prevout::new(Txid::from_byte_array([0xAA; 32]), 0, Amount::from_sat(20_000)),
            slot_count: 3,
            slot_size: Amount::from_sat(550),
            fee: Amount::from_sat(8000),
            change_address: change_address(),
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut auction = chain();

        let split = auction.split(&builder, &split_params()).unwrap();
        assert_eq!(auction.phase(), AuctionPhase::Split);
        assert_eq!(auction.slot_status(0), Some(SlotStatus::Open));

        let offers = auction.offer(&builder, change_address()).unwrap();
        assert_eq!(offers.len(), 3);
        assert_eq!(auction.unsold(), vec![0, 1, 2]);

        auction.mark_claimed(1).unwrap();
        assert_eq!(auction.unsold(), vec![0, 2]);
        assert_eq!(auction.phase(), AuctionPhase::Offered);

        let steps = auction
            .reclaim(
                &builder,
                Prevout::new(split.signed.txid(), 3, split.change),
                Amount::from_sat(500),
                change_address(),
                EthAddress::repeat_byte(0x01),
            )
            .unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].slot.outpoint.vout, 0);
        assert_eq!(steps[1].slot.outpoint.vout, 2);
        assert_eq!(auction.slot_status(2), Some(SlotStatus::Reclaimed));
        assert_eq!(auction.phase(), AuctionPhase::Settled);
    }

    #[test]
    fn test_out_of_order_transitions() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut auction = chain();

        assert!(matches!(
            auction.offer(&builder, change_address()),
            Err(ChainError::InvalidTransition {
                from: AuctionPhase::Unfunded,
                ..
            })
        ));
        assert!(auction.mark_claimed(0).is_err());

        auction.split(&builder, &split_params()).unwrap();
        assert!(matches!(
            auction.split(&builder, &split_params()),
            Err(ChainError::InvalidTransition { .. })
        ));

        auction.offer(&builder, change_address()).unwrap();
        auction.mark_claimed(0).unwrap();
        assert!(auction.mark_claimed(0).is_err());
        assert!(matches!(
            auction.mark_claimed(9),
            Err(ChainError::SlotOutOfRange { index: 9, slots: 3 })
        ));
    }

    #[test]
    fn test_failed_reclaim_can_be_retried() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut auction = chain();

        let split = auction.split(&builder, &split_params()).unwrap();
        auction.offer(&builder, change_address()).unwrap();

        let underfunded = Prevout::new(split.signed.txid(), 3, Amount::from_sat(100));
        assert!(matches!(
            auction.reclaim(
                &builder,
                underfunded,
                Amount::from_sat(7700),
                change_address(),
                EthAddress::repeat_byte(0x01),
            ),
            Err(ChainError::InsufficientFunds { .. })
        ));
        assert_eq!(auction.phase(), AuctionPhase::Offered);
        assert_eq!(auction.unsold(), vec![0, 1, 2]);

        // A buyer can still land while the seller re-funds
        auction.mark_claimed(0).unwrap();

        let steps = auction
            .reclaim(
                &builder,
                Prevout::new(split.signed.txid(), 3, split.change),
                Amount::from_sat(500),
                change_address(),
                EthAddress::repeat_byte(0x01),
            )
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(auction.slot_status(0), Some(SlotStatus::Claimed));
        assert_eq!(auction.slot_status(1), Some(SlotStatus::Reclaimed));
        assert_eq!(auction.phase(), AuctionPhase::Settled);
    }

    #[test]
    fn test_all_claimed_settles() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut auction = chain();

        auction.split(&builder, &split_params()).unwrap();
        auction.offer(&builder, change_address()).unwrap();
        for i in 0..3 {
            auction.mark_claimed(i).unwrap();
        }
        assert_eq!(auction.phase(), AuctionPhase::Settled);
    }

    #[test]
    fn test_foreign_signer_rejected() {
        let other = SingleKeySigner::from_bytes(&[0x33; 32]).unwrap();
        let builder = ChainBuilder::new(&other, Network::Regtest);
        let mut auction = chain();

        assert!(matches!(
            auction.split(&builder, &split_params()),
            Err(ChainError::ControlKeyMismatch)
        ));
        assert_eq!(auction.phase(), AuctionPhase::Unfunded);
    }
}
