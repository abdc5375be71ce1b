//! Transaction chain errors

use thiserror::Error;

use super::state::AuctionPhase;
use crate::sighash::SighashError;
use crate::signer::SignerError;

/// Errors raised while building the split, offer and shutdown transactions
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("insufficient funds: need {required} sats, have {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("at least one slot is required")]
    NoSlots,

    #[error("offer schedule is empty")]
    EmptySchedule,

    #[error("offer {index} has a zero price")]
    ZeroPrice { index: usize },

    #[error("shutdown step {step} needs the previous step's txid first")]
    SequenceDependencyUnresolved { step: usize },

    #[error("shutdown cascade already complete")]
    CascadeComplete,

    #[error("step {step} is not the last built shutdown step")]
    UnknownStep { step: usize },

    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: AuctionPhase,
        action: &'static str,
    },

    #[error("slot {index} out of range ({slots} slots)")]
    SlotOutOfRange { index: usize, slots: usize },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction was not signed by the control key")]
    ControlKeyMismatch,

    #[error(transparent)]
    Sighash(#[from] SighashError),

    #[error(transparent)]
    Signer(#[from] SignerError),
}
