//! Integration tests for the auction flow
//!
//! Runs a full auction set offline: split, offers, a buyer completing one
//! offer, SPV proof, claim assembly and the shutdown cascade.

use std::collections::HashMap;

use alloy_primitives::{Address as EthAddress, U256};
use async_trait::async_trait;
use bitcoin::{
    consensus, hashes::Hash, Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};

use integral_auction::proof::{BlockHeader, HeaderChain, MerkleProof};
use integral_auction::settlement::{
    CalldataEncoder, ChainSource, ClaimInput, ConfirmedTx, OpenTerms, SettlementAssembler,
    SettlementError, SourceError,
};
use integral_auction::{
    AuctionChain, AuctionPhase, ChainBuilder, DigestSigner, EsploraClient, OfferSchedule, Prevout,
    SingleKeySigner, SlotStatus, SplitParams,
};

const HEADER_COUNT: u32 = 2;

fn seller() -> SingleKeySigner {
    SingleKeySigner::from_seed(b"integration seller").unwrap()
}

fn buyer_address() -> Address {
    let buyer = SingleKeySigner::from_seed(b"integration buyer").unwrap();
    Address::p2wpkh(&buyer.public_key(), Network::Regtest)
}

/// Buyer funds the offer with an extra input and takes change
fn complete_offer(partial: &Transaction) -> Transaction {
    let mut tx = partial.clone();
    tx.input.push(TxIn {
        previous_output: OutPoint {
            txid: Txid::from_byte_array([0x77; 32]),
            vout: 3,
        },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]),
    });
    tx.output.push(TxOut {
        value: Amount::from_sat(4_000),
        script_pubkey: buyer_address().script_pubkey(),
    });
    tx
}

/// Chain of `count` headers whose first header commits to `root`
fn headers_for(root: [u8; 32], count: u32) -> HeaderChain {
    let mut chain = HeaderChain::default();
    let mut prev = [0u8; 32];
    for i in 0..count {
        let header = BlockHeader {
            version: 0x2000_0000,
            prev_block_hash: prev,
            merkle_root: if i == 0 { root } else { [i as u8; 32] },
            timestamp: 1_700_000_000 + i * 600,
            bits: 0x207f_ffff,
            nonce: i,
        };
        prev = header.block_hash();
        chain.push(header);
    }
    chain
}

/// In-memory chain: one block per confirmed transaction
#[derive(Default)]
struct FixtureSource {
    blocks: HashMap<Txid, (u32, Vec<u8>, MerkleProof)>,
}

impl FixtureSource {
    fn confirm(&mut self, tx: &Transaction, height: u32) {
        let txid = tx.compute_txid();
        let txids = [[0x01; 32], [0x02; 32], txid.to_byte_array()];
        let proof = MerkleProof::from_block_txids(&txids, 2).unwrap();
        self.blocks
            .insert(txid, (height, consensus::serialize(tx), proof));
    }

    fn root_at(&self, height: u32) -> Option<[u8; 32]> {
        self.blocks
            .values()
            .find(|(h, _, _)| *h == height)
            .map(|(_, _, proof)| proof.root)
    }
}

#[async_trait]
impl ChainSource for FixtureSource {
    async fn fetch_transaction(&self, txid: &Txid) -> Result<ConfirmedTx, SourceError> {
        let (height, raw, _) = self
            .blocks
            .get(txid)
            .ok_or(SourceError::NotConfirmed(*txid))?;
        Ok(ConfirmedTx {
            txid: *txid,
            raw: raw.clone(),
            block_height: *height,
        })
    }

    async fn fetch_merkle_proof(
        &self,
        txid: &Txid,
        _block_height: u32,
    ) -> Result<MerkleProof, SourceError> {
        self.blocks
            .get(txid)
            .map(|(_, _, proof)| proof.clone())
            .ok_or_else(|| SourceError::NotFound(txid.to_string()))
    }

    async fn fetch_header_chain(
        &self,
        start_height: u32,
        count: u32,
    ) -> Result<HeaderChain, SourceError> {
        let root = self
            .root_at(start_height)
            .ok_or_else(|| SourceError::NotFound(format!("block {}", start_height)))?;
        Ok(headers_for(root, count))
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SourceError> {
        Ok(tx.compute_txid())
    }
}

#[tokio::test]
async fn test_full_auction_flow() {
    let signer = seller();
    let builder = ChainBuilder::new(&signer, Network::Regtest);
    let seller_address = builder.control_address();

    let schedule = OfferSchedule::from_pairs(&[(10_000, 0), (9_000, 144), (8_000, 288)]).unwrap();
    let mut auction = AuctionChain::new(signer.public_key(), schedule);

    // Split 4 slots out of a confirmed funding output
    let split = auction
        .split(
            &builder,
            &SplitParams {
                funding: Prevout::new(
                    Txid::from_byte_array([0x10; 32]),
                    0,
                    Amount::from_sat(50_000),
                ),
                slot_count: 4,
                slot_size: Amount::from_sat(550),
                fee: Amount::from_sat(8_000),
                change_address: seller_address.clone(),
            },
        )
        .unwrap();
    assert_eq!(split.change, Amount::from_sat(50_000 - 4 * 550 - 8_000));

    let offers = auction.offer(&builder, seller_address.clone()).unwrap();
    assert_eq!(offers.len(), 4);

    // Every slot gets one `open`
    let assembler = SettlementAssembler::new(CalldataEncoder::new(EthAddress::ZERO), HEADER_COUNT);
    let opens = assembler.assemble_opens(
        &offers,
        &OpenTerms {
            reserve_price: U256::from(1_000_000u64),
            req_difficulty: U256::from(1u64),
            asset: EthAddress::ZERO,
            value: U256::from(550u64),
        },
        0,
    );
    assert!(opens.iter().all(|c| c.is_ok()));
    assert_eq!(
        opens.iter().map(|c| c.nonce).collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2), Some(3)]
    );

    // Buyers complete offers on slots 0 and 3
    let won_a = complete_offer(&offers[0].offers[1].signed.tx);
    let won_b = complete_offer(&offers[3].offers[2].signed.tx);
    let mut source = FixtureSource::default();
    source.confirm(&won_a, 800_100);
    source.confirm(&won_b, 800_200);
    auction.mark_claimed(0).unwrap();
    auction.mark_claimed(3).unwrap();

    let unconfirmed = Txid::from_byte_array([0x99; 32]);
    let claims = assembler
        .assemble_from_source(
            &source,
            &[won_a.compute_txid(), unconfirmed, won_b.compute_txid()],
            4,
        )
        .await;

    assert_eq!(claims.len(), 3);
    assert_eq!(claims[0].result.as_ref().unwrap().nonce, 4);
    assert!(matches!(
        claims[1].result,
        Err(SettlementError::Source {
            index: 1,
            source: SourceError::NotConfirmed(_)
        })
    ));
    assert_eq!(claims[2].result.as_ref().unwrap().nonce, 6);

    // Reclaim slots 1 and 2
    let steps = auction
        .reclaim(
            &builder,
            Prevout::new(split.signed.txid(), 4, split.change),
            Amount::from_sat(7_700),
            seller_address,
            EthAddress::repeat_byte(0xab),
        )
        .unwrap();

    assert_eq!(steps.len(), 2);
    let first = split.change.to_sat() + 550 - 7_700;
    assert_eq!(steps[0].output_value, Amount::from_sat(first));
    assert_eq!(steps[1].output_value, Amount::from_sat(first + 550 - 7_700));
    assert!(steps[1].is_final);
    assert_eq!(auction.slot_status(1), Some(SlotStatus::Reclaimed));
    assert_eq!(auction.phase(), AuctionPhase::Settled);
}

#[test]
fn test_offline_claim_round_trip() {
    let signer = seller();
    let builder = ChainBuilder::new(&signer, Network::Regtest);
    let split = builder
        .build_split(&SplitParams {
            funding: Prevout::new(Txid::from_byte_array([0x20; 32]), 1, Amount::from_sat(20_000)),
            slot_count: 1,
            slot_size: Amount::from_sat(550),
            fee: Amount::from_sat(8_000),
            change_address: buyer_address(),
        })
        .unwrap();

    // A signed transaction re-serializes byte for byte
    let bytes = split.signed.serialize();
    let parsed: Transaction = consensus::deserialize(&bytes).unwrap();
    assert_eq!(consensus::serialize(&parsed), bytes);

    let txids = [split.signed.txid().to_byte_array(), [0x03; 32]];
    let proof = MerkleProof::from_block_txids(&txids, 0).unwrap();
    let proof = MerkleProof::from_hex(&proof.to_hex(), proof.position).unwrap();
    assert!(proof.verify());

    let assembler = SettlementAssembler::new(CalldataEncoder::new(EthAddress::ZERO), HEADER_COUNT);
    let calls = assembler.assemble_claims(
        &[ClaimInput {
            tx: bytes,
            headers: headers_for(proof.root, HEADER_COUNT + 1),
            proof,
        }],
        12,
    );
    let encoded = calls[0].result.as_ref().unwrap();
    assert_eq!(encoded.nonce, 12);
    assert!(encoded.data.len() > 4 + 128);
}

#[tokio::test]
#[ignore = "Requires network access to Esplora"]
async fn test_esplora_header_chain() {
    let client = EsploraClient::new_testnet();
    let tip = client.get_tip_height().await.unwrap();
    let chain = client
        .fetch_header_chain(tip - HEADER_COUNT, HEADER_COUNT + 1)
        .await
        .unwrap();

    assert_eq!(chain.len(), (HEADER_COUNT + 1) as usize);
    chain.verify_links().unwrap();
}
