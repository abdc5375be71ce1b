//! BIP143 Signature Hashing
//!
//! Computes the segwit v0 digest a signature commits to. The preimage is
//! assembled field by field so that the anyone-can-pay and SINGLE/NONE
//! scoping rules are explicit:
//!
//! ```text
//! version | hashPrevouts | hashSequence | outpoint | scriptCode | value
//!         | nSequence | hashOutputs | nLockTime | sighash type
//! ```
//!
//! Under `SINGLE | ANYONECANPAY` the digest depends only on the signed input
//! and the output at the same index, which is what lets a third party extend
//! an offer transaction with their own inputs and outputs.

use bitcoin::{
    consensus, sighash::EcdsaSighashType, Amount, CompressedPublicKey, ScriptBuf, Transaction,
};
use thiserror::Error;

use crate::proof::double_sha256;

const ANYONE_CAN_PAY: u32 = 0x80;

/// Base sighash type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SighashType {
    All = 1,
    None = 2,
    Single = 3,
}

/// Base type plus the anyone-can-pay modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SighashMode {
    pub base: SighashType,
    pub anyone_can_pay: bool,
}

impl SighashMode {
    /// Commit to every input and output
    pub const ALL: Self = Self {
        base: SighashType::All,
        anyone_can_pay: false,
    };

    /// Commit to one input and its paired output
    pub const SINGLE_ANYONECANPAY: Self = Self {
        base: SighashType::Single,
        anyone_can_pay: true,
    };

    pub fn new(base: SighashType, anyone_can_pay: bool) -> Self {
        Self {
            base,
            anyone_can_pay,
        }
    }

    /// 4-byte sighash word
    pub fn to_u32(self) -> u32 {
        let flag = if self.anyone_can_pay { ANYONE_CAN_PAY } else { 0 };
        self.base as u32 | flag
    }

    /// Byte appended to a DER signature in the witness
    pub fn to_byte(self) -> u8 {
        self.to_u32() as u8
    }

    /// Same mode in `bitcoin`'s representation
    pub fn to_ecdsa(self) -> EcdsaSighashType {
        EcdsaSighashType::from_consensus(self.to_u32())
    }
}

/// Script code for the signed input.
///
/// Callers say whether the bytes already carry their length prefix; the
/// engine never guesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCode {
    /// Raw script, prefixed with its compact-size length when hashed
    Bare(ScriptBuf),
    /// Script already serialized with its compact-size length
    Prefixed(Vec<u8>),
}

impl ScriptCode {
    /// Length-prefixed bytes as they appear in the preimage
    pub fn to_prefixed(&self) -> Result<Vec<u8>, SighashError> {
        match self {
            ScriptCode::Bare(script) => Ok(consensus::serialize(script)),
            ScriptCode::Prefixed(bytes) => {
                // Must decode as exactly one length-prefixed script
                consensus::deserialize::<ScriptBuf>(bytes)
                    .map_err(|e| SighashError::InvalidScriptCode(e.to_string()))?;
                Ok(bytes.clone())
            }
        }
    }
}

/// `0x76 0xa9 0x14 <hash160> 0x88 0xac` for a P2WPKH key
pub fn p2wpkh_script_code(public_key: &CompressedPublicKey) -> ScriptCode {
    ScriptCode::Bare(ScriptBuf::new_p2pkh(&public_key.pubkey_hash()))
}

/// Inputs to one digest computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SighashContext {
    pub input_index: usize,
    pub script_code: ScriptCode,
    pub prevout_value: Amount,
    pub mode: SighashMode,
}

impl SighashContext {
    pub fn new(
        input_index: usize,
        script_code: ScriptCode,
        prevout_value: Amount,
        mode: SighashMode,
    ) -> Self {
        Self {
            input_index,
            script_code,
            prevout_value,
            mode,
        }
    }
}

/// Sighash errors
#[derive(Debug, Error)]
pub enum SighashError {
    #[error("invalid script code: {0}")]
    InvalidScriptCode(String),

    #[error("input index {index} out of range ({inputs} inputs)")]
    InputIndexOutOfRange { index: usize, inputs: usize },

    #[error("SIGHASH_SINGLE input {index} has no matching output")]
    MissingSingleOutput { index: usize },
}

/// Serialized BIP143 preimage
pub fn preimage(tx: &Transaction, ctx: &SighashContext) -> Result<Vec<u8>, SighashError> {
    let input = tx
        .input
        .get(ctx.input_index)
        .ok_or(SighashError::InputIndexOutOfRange {
            index: ctx.input_index,
            inputs: tx.input.len(),
        })?;
    let mode = ctx.mode;
    let zero = [0u8; 32];

    let hash_prevouts = if mode.anyone_can_pay {
        zero
    } else {
        let mut buf = Vec::with_capacity(36 * tx.input.len());
        for txin in &tx.input {
            buf.extend(consensus::serialize(&txin.previous_output));
        }
        double_sha256(&buf)
    };

    let hash_sequence = if mode.anyone_can_pay || mode.base != SighashType::All {
        zero
    } else {
        let mut buf = Vec::with_capacity(4 * tx.input.len());
        for txin in &tx.input {
            buf.extend_from_slice(&txin.sequence.to_consensus_u32().to_le_bytes());
        }
        double_sha256(&buf)
    };

    let hash_outputs = match mode.base {
        SighashType::All => {
            let mut buf = Vec::new();
            for txout in &tx.output {
                buf.extend(consensus::serialize(txout));
            }
            double_sha256(&buf)
        }
        SighashType::Single => {
            let txout = tx
                .output
                .get(ctx.input_index)
                .ok_or(SighashError::MissingSingleOutput {
                    index: ctx.input_index,
                })?;
            double_sha256(&consensus::serialize(txout))
        }
        SighashType::None => zero,
    };

    let script_code = ctx.script_code.to_prefixed()?;

    let mut data = Vec::with_capacity(156 + script_code.len());
    data.extend_from_slice(&tx.version.0.to_le_bytes());
    data.extend_from_slice(&hash_prevouts);
    data.extend_from_slice(&hash_sequence);
    data.extend(consensus::serialize(&input.previous_output));
    data.extend_from_slice(&script_code);
    data.extend_from_slice(&ctx.prevout_value.to_sat().to_le_bytes());
    data.extend_from_slice(&input.sequence.to_consensus_u32().to_le_bytes());
    data.extend_from_slice(&hash_outputs);
    data.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    data.extend_from_slice(&mode.to_u32().to_le_bytes());

    Ok(data)
}

/// BIP143 digest for one input
pub fn digest(tx: &Transaction, ctx: &SighashContext) -> Result<[u8; 32], SighashError> {
    Ok(double_sha256(&preimage(tx, ctx)?))
}
