//! Shared Types Module
//!
//! Data types shared across the auction components.

pub mod auction;
pub mod units;

// Re-exports for convenience
pub use auction::{
    AuctionOffer, OfferParams, OfferSchedule, Prevout, ShutdownParams, SplitParams, UnsplitParams,
};
pub use units::{parse_sats, sats_to_btc_string, sats_to_display, SATS_PER_BTC};
