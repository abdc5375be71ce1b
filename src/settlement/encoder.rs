//! Settlement Call Encoding
//!
//! Argument shapes for the two contract entry points and the seam to the
//! Ethereum encoder/signer. [`CalldataEncoder`] produces ABI calldata; a
//! wallet-backed encoder can sign and return raw transactions instead.

use alloy_primitives::{Address as EthAddress, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use thiserror::Error;

use crate::proof::HEADER_SIZE;

mod abi {
    use super::sol;

    sol! {
        function open(bytes partialTx, uint256 reservePrice, uint256 reqDiff, address asset, uint256 value);
        function claim(bytes tx, bytes proof, uint256 index, bytes headers);
    }
}

/// Arguments of `open(partialTx, reservePrice, reqDiff, asset, value)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    /// Signed offers for one slot, concatenated
    pub partial_tx: Vec<u8>,
    pub reserve_price: U256,
    pub req_difficulty: U256,
    pub asset: EthAddress,
    pub value: U256,
}

/// Arguments of `claim(tx, proof, index, headers)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCall {
    /// Winning transaction, consensus-serialized
    pub tx: Vec<u8>,
    /// Merkle proof blob
    pub proof: Vec<u8>,
    /// 1-indexed leaf position
    pub index: u32,
    /// Concatenated 80-byte headers
    pub headers: Vec<u8>,
}

/// Encoder output for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    /// Contract the call targets
    pub to: EthAddress,
    /// Account sequence number to submit with
    pub nonce: u64,
    pub data: Vec<u8>,
}

/// Encoder rejections
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("rejected argument {argument}: {reason}")]
    Rejected {
        argument: &'static str,
        reason: String,
    },
}

impl EncodeError {
    fn rejected(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            argument,
            reason: reason.into(),
        }
    }
}

/// Turns call arguments into something submittable on the Ethereum side
#[cfg_attr(test, mockall::automock)]
pub trait CallEncoder: Send + Sync {
    fn encode_open(&self, call: &OpenCall, nonce: u64) -> Result<EncodedCall, EncodeError>;

    fn encode_claim(&self, call: &ClaimCall, nonce: u64) -> Result<EncodedCall, EncodeError>;
}

/// ABI calldata encoder for the auction contract
#[derive(Debug, Clone)]
pub struct CalldataEncoder {
    contract: EthAddress,
}

impl CalldataEncoder {
    pub fn new(contract: EthAddress) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> EthAddress {
        self.contract
    }
}

impl CallEncoder for CalldataEncoder {
    fn encode_open(&self, call: &OpenCall, nonce: u64) -> Result<EncodedCall, EncodeError> {
        if call.partial_tx.is_empty() {
            return Err(EncodeError::rejected("partialTx", "empty"));
        }

        let data = abi::openCall {
            partialTx: Bytes::from(call.partial_tx.clone()),
            reservePrice: call.reserve_price,
            reqDiff: call.req_difficulty,
            asset: call.asset,
            value: call.value,
        }
        .abi_encode();

        Ok(EncodedCall {
            to: self.contract,
            nonce,
            data,
        })
    }

    fn encode_claim(&self, call: &ClaimCall, nonce: u64) -> Result<EncodedCall, EncodeError> {
        if call.tx.is_empty() {
            return Err(EncodeError::rejected("tx", "empty"));
        }
        if call.proof.len() < 64 || call.proof.len() % 32 != 0 {
            return Err(EncodeError::rejected(
                "proof",
                format!("{} bytes is not a proof blob", call.proof.len()),
            ));
        }
        if call.headers.is_empty() || call.headers.len() % HEADER_SIZE != 0 {
            return Err(EncodeError::rejected(
                "headers",
                format!("{} bytes is not a header chain", call.headers.len()),
            ));
        }

        let data = abi::claimCall {
            tx: Bytes::from(call.tx.clone()),
            proof: Bytes::from(call.proof.clone()),
            index: U256::from(call.index),
            headers: Bytes::from(call.headers.clone()),
        }
        .abi_encode();

        Ok(EncodedCall {
            to: self.contract,
            nonce,
            data,
        })
    }
}
