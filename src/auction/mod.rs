//! Auction Transaction Chain
//!
//! Produces the Bitcoin side of a dutch auction set.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    AUCTION CHAIN                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. Split                                                       │
//! │     └── funding → N slots + change   (SINGLE|ANYONECANPAY)      │
//! │                                                                 │
//! │  2. Offer                                                       │
//! │     └── per slot, per (price, locktime)                         │
//! │         slot → recipient @ price     (SINGLE|ANYONECANPAY)      │
//! │                                                                 │
//! │  3. Claim                                                       │
//! │     └── buyer completes one offer, observed on chain            │
//! │                                                                 │
//! │  4. Shutdown                                                    │
//! │     └── (slot, running funding) → next funding   (ALL)          │
//! │     └── last step pays change + OP_RETURN <eth address>         │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod error;
pub mod shutdown;
pub mod state;

pub use builder::{
    ChainBuilder, SignedOffer, SignedTx, SlotOffers, SplitTx, DEFAULT_SEQUENCE, OFFER_SEQUENCE,
};
pub use error::ChainError;
pub use shutdown::{ShutdownCascade, ShutdownStep};
pub use state::{AuctionChain, AuctionPhase, SlotStatus};
