//! Shutdown Cascade
//!
//! Reclaims unsold slots one transaction at a time. Step `k` spends an
//! unsold slot together with the running funding output and pays
//! `running + slot_size - fee` to output 0, which funds step `k + 1`:
//!
//! ```text
//! funding ──┐
//!           ├─► step 0 ──┐
//! slot a ───┘            ├─► step 1 ──► ... ──► final (change + OP_RETURN)
//!              slot b ───┘
//! ```
//!
//! Step `k + 1` cannot be signed until step `k` has been materialized and
//! its txid is known.

use alloy_primitives::Address as EthAddress;
use bitcoin::{
    absolute::LockTime,
    script::PushBytesBuf,
    transaction::Version,
    Amount, ScriptBuf, Transaction, TxOut, Txid,
};
use tracing::{debug, info};

use super::builder::{unsigned_input, ChainBuilder, SignedTx, DEFAULT_SEQUENCE};
use super::ChainError;
use crate::common::logging::log_chain_event;
use crate::sighash::SighashMode;
use crate::signer::DigestSigner;
use crate::types::{Prevout, ShutdownParams};

/// One link of the cascade
#[derive(Debug, Clone)]
pub struct ShutdownStep {
    /// Position in the cascade
    pub index: usize,
    /// Slot reclaimed by this step
    pub slot: Prevout,
    /// Running funding spent by this step
    pub funding: Prevout,
    pub signed: SignedTx,
    /// Value of output 0
    pub output_value: Amount,
    /// Last step pays the change address and carries the settlement address
    pub is_final: bool,
}

impl ShutdownStep {
    pub fn txid(&self) -> Txid {
        self.signed.txid()
    }

    /// Output 0 of this step, funding the next one
    pub fn next_funding(&self) -> Prevout {
        Prevout::new(self.txid(), 0, self.output_value)
    }
}

/// Sequential builder for the shutdown transactions
#[derive(Debug, Clone)]
pub struct ShutdownCascade {
    params: ShutdownParams,
    /// Funding for the next step; `None` until the last step is materialized
    funding: Option<Prevout>,
    steps: Vec<ShutdownStep>,
}

impl ShutdownCascade {
    pub fn new(params: ShutdownParams) -> Result<Self, ChainError> {
        if params.unsold.is_empty() {
            return Err(ChainError::NoSlots);
        }

        Ok(Self {
            funding: Some(params.funding),
            params,
            steps: Vec::new(),
        })
    }

    /// Build and sign the next step.
    ///
    /// Fails with `SequenceDependencyUnresolved` if the previous step has
    /// not been passed to [`ShutdownCascade::materialize`] yet.
    pub fn build_step<S: DigestSigner + ?Sized>(
        &mut self,
        builder: &ChainBuilder<'_, S>,
    ) -> Result<ShutdownStep, ChainError> {
        let index = self.steps.len();
        let slot_vout = *self
            .params
            .unsold
            .get(index)
            .ok_or(ChainError::CascadeComplete)?;
        let funding = self
            .funding
            .ok_or(ChainError::SequenceDependencyUnresolved { step: index })?;

        let slot = Prevout::new(self.params.split_txid, slot_vout, self.params.slot_size);
        let is_final = index + 1 == self.params.unsold.len();

        let available = funding
            .value
            .checked_add(slot.value)
            .ok_or(ChainError::AmountOverflow)?;
        let output_value =
            available
                .checked_sub(self.params.fee)
                .ok_or(ChainError::InsufficientFunds {
                    required: self.params.fee.to_sat(),
                    available: available.to_sat(),
                })?;

        let mut output = Vec::with_capacity(2);
        if is_final {
            output.push(TxOut {
                value: output_value,
                script_pubkey: self.params.change_address.script_pubkey(),
            });
            output.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: settlement_script(&self.params.settlement_address)?,
            });
        } else {
            output.push(TxOut {
                value: output_value,
                script_pubkey: builder.control_address().script_pubkey(),
            });
        }

        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![
                unsigned_input(slot.outpoint, DEFAULT_SEQUENCE),
                unsigned_input(funding.outpoint, DEFAULT_SEQUENCE),
            ],
            output,
        };

        let signed = builder.sign(
            unsigned,
            &[
                (slot.value, SighashMode::ALL),
                (funding.value, SighashMode::ALL),
            ],
        )?;

        let step = ShutdownStep {
            index,
            slot,
            funding,
            signed,
            output_value,
            is_final,
        };

        debug!(
            step = index,
            slot = slot_vout,
            output = output_value.to_sat(),
            "shutdown step signed"
        );
        log_chain_event(
            if is_final { "shutdown_final" } else { "shutdown_step" },
            &step.txid().to_string(),
            output_value.to_sat(),
            2,
        );

        self.funding = None;
        self.steps.push(step.clone());
        Ok(step)
    }

    /// Record the txid of the last built step so the next one can spend it.
    ///
    /// The txid is recomputed from the step's serialization.
    pub fn materialize(&mut self, step: &ShutdownStep) -> Result<Prevout, ChainError> {
        let last = self
            .steps
            .last()
            .ok_or(ChainError::UnknownStep { step: step.index })?;
        if last.index != step.index || last.signed != step.signed {
            return Err(ChainError::UnknownStep { step: step.index });
        }

        let next = step.next_funding();
        if !step.is_final {
            self.funding = Some(next);
        }
        Ok(next)
    }

    /// Build and materialize every remaining step
    pub fn build_all<S: DigestSigner + ?Sized>(
        &mut self,
        builder: &ChainBuilder<'_, S>,
    ) -> Result<Vec<ShutdownStep>, ChainError> {
        let mut built = Vec::with_capacity(self.remaining());
        while !self.is_complete() {
            let step = self.build_step(builder)?;
            self.materialize(&step)?;
            built.push(step);
        }

        info!(
            steps = self.steps.len(),
            settlement = %self.params.settlement_address,
            "shutdown cascade complete"
        );
        Ok(built)
    }

    pub fn steps(&self) -> &[ShutdownStep] {
        &self.steps
    }

    pub fn remaining(&self) -> usize {
        self.params.unsold.len() - self.steps.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Zero-value `OP_RETURN <20-byte address>`
fn settlement_script(address: &EthAddress) -> Result<ScriptBuf, ChainError> {
    let data = PushBytesBuf::try_from(address.to_vec())
        .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
    Ok(ScriptBuf::new_op_return(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::builder::tests::{assert_input_signed, change_address, control_signer};
    use bitcoin::{hashes::Hash, Network, OutPoint};

    const FUNDING: u64 = 20_000;

    fn settlement() -> EthAddress {
        EthAddress::repeat_byte(0x5a)
    }

    fn params(unsold: Vec<u32>) -> ShutdownParams {
        ShutdownParams {
            split_txid: Txid::from_byte_array([0xEE; 32]),
            unsold,
            slot_size: Amount::from_sat(550),
            funding: Prevout::new(
                Txid::from_byte_array([0xAA; 32]),
                0,
                Amount::from_sat(FUNDING),
            ),
            fee: Amount::from_sat(7700),
            change_address: change_address(),
            settlement_address: settlement(),
        }
    }

    #[test]
    fn test_two_step_cascade() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut cascade = ShutdownCascade::new(params(vec![2, 0])).unwrap();

        let steps = cascade.build_all(&builder).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(cascade.is_complete());

        let first = &steps[0];
        assert_eq!(first.output_value, Amount::from_sat(FUNDING + 550 - 7700));
        assert!(!first.is_final);
        assert_eq!(first.signed.tx.output.len(), 1);
        assert_eq!(
            first.signed.tx.output[0].script_pubkey,
            builder.control_address().script_pubkey()
        );
        assert_eq!(first.signed.tx.input[0].previous_output.vout, 2);

        let second = &steps[1];
        assert_eq!(
            second.output_value,
            Amount::from_sat(FUNDING + 550 - 7700 + 550 - 7700)
        );
        assert!(second.is_final);
        assert_eq!(second.funding, first.next_funding());
        assert_eq!(
            second.signed.tx.input[1].previous_output,
            OutPoint {
                txid: first.txid(),
                vout: 0
            }
        );
        assert_eq!(second.signed.tx.input[0].previous_output.vout, 0);

        let outputs = &second.signed.tx.output;
        assert_eq!(outputs[0].script_pubkey, change_address().script_pubkey());
        assert_eq!(outputs[1].value, Amount::ZERO);
        assert!(outputs[1].script_pubkey.is_op_return());
        assert_eq!(&outputs[1].script_pubkey.as_bytes()[2..], settlement().as_slice());

        for step in &steps {
            assert_input_signed(
                &step.signed.tx,
                0,
                Amount::from_sat(550),
                SighashMode::ALL,
                &signer.public_key(),
            );
            assert_input_signed(
                &step.signed.tx,
                1,
                step.funding.value,
                SighashMode::ALL,
                &signer.public_key(),
            );
        }
    }

    #[test]
    fn test_next_step_needs_materialized_txid() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);
        let mut cascade = ShutdownCascade::new(params(vec![0, 1, 2])).unwrap();

        let first = cascade.build_step(&builder).unwrap();
        assert!(matches!(
            cascade.build_step(&builder),
            Err(ChainError::SequenceDependencyUnresolved { step: 1 })
        ));

        let next = cascade.materialize(&first).unwrap();
        assert_eq!(next.outpoint.txid, first.signed.tx.compute_txid());

        let second = cascade.build_step(&builder).unwrap();
        assert_eq!(second.funding, next);
        assert_eq!(cascade.remaining(), 1);

        // Only the latest step can be materialized
        assert!(matches!(
            cascade.materialize(&first),
            Err(ChainError::UnknownStep { step: 0 })
        ));
    }

    #[test]
    fn test_cascade_runs_dry() {
        let signer = control_signer();
        let builder = ChainBuilder::new(&signer, Network::Regtest);

        let mut starved = params(vec![0]);
        starved.funding.value = Amount::from_sat(7000);
        let mut cascade = ShutdownCascade::new(starved).unwrap();
        assert!(matches!(
            cascade.build_step(&builder),
            Err(ChainError::InsufficientFunds {
                required: 7700,
                available: 7550
            })
        ));

        let mut done = ShutdownCascade::new(params(vec![1])).unwrap();
        done.build_all(&builder).unwrap();
        assert!(matches!(
            done.build_step(&builder),
            Err(ChainError::CascadeComplete)
        ));

        assert!(matches!(
            ShutdownCascade::new(params(vec![])),
            Err(ChainError::NoSlots)
        ));
    }
}
