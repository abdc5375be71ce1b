//! Integral Auction - Operator CLI
//!
//! Builds and signs the Bitcoin side of an auction set and assembles the
//! Ethereum settlement calls.
//!
//! Run modes:
//!   cargo run                    - Show usage
//!   cargo run -- split ...       - Split a funding output into slots
//!   cargo run -- offers ...      - Sign the dutch offers for each slot
//!   cargo run -- shutdown ...    - Reclaim unsold slots
//!   cargo run -- verify-proof .. - Check a Merkle proof blob
//!   cargo run -- settle ...      - Fetch proofs and encode claim calls
//!   cargo run -- demo            - Offline walkthrough on regtest

use std::env;
use std::process;
use std::str::FromStr;

use alloy_primitives::{Address as EthAddress, U256};
use bitcoin::{hashes::Hash, Address, Amount, Txid};
use tracing::info;

use integral_auction::common::{init_from_config, AuctionConfig, AuctionError, Result};
use integral_auction::proof::{HeaderChain, MerkleProof};
use integral_auction::settlement::{
    CalldataEncoder, ClaimInput, OpenTerms, SettlementAssembler, SettlementCall,
};
use integral_auction::types::{
    parse_sats, sats_to_display, AuctionOffer, OfferParams, OfferSchedule, Prevout, ShutdownParams,
    SplitParams,
};
use integral_auction::{
    AuctionChain, ChainBuilder, DigestSigner, EsploraClient, ShutdownCascade, SingleKeySigner,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let config = match AuctionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let result = match args[1].as_str() {
        "split" => run_split(&config, &args[2..]),
        "offers" => run_offers(&config, &args[2..]),
        "shutdown" => run_shutdown(&config, &args[2..]),
        "verify-proof" => run_verify_proof(&args[2..]),
        "settle" => run_settle(&config, &args[2..]).await,
        "demo" => run_demo(&config),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        process::exit(1);
    }
}

fn print_usage() {
    println!("Integral Auction - Cross-Chain Dutch Auctions");
    println!();
    println!("Usage:");
    println!("  integral-auction split --funding <txid:vout:sats> --slots <n> --change <addr>");
    println!("  integral-auction offers --slot <txid:vout> [--slot ...] --recipient <addr>");
    println!("                          --offer <price:locktime> [--offer ...]");
    println!("  integral-auction shutdown --split <txid> --unsold <i,j,...>");
    println!("                            --funding <txid:vout:sats> --change <addr> --eth <0x...>");
    println!("  integral-auction verify-proof --proof <hex> --position <n> [--headers <hex>]");
    println!("  integral-auction settle --nonce <n> <txid> [<txid> ...]");
    println!("  integral-auction demo                          Offline regtest walkthrough");
    println!();
    println!("Environment Variables:");
    println!("  AUCTION_NETWORK            mainnet | testnet | signet | regtest (default: testnet)");
    println!("  AUCTION_ESPLORA_URL        Esplora endpoint (default: per network)");
    println!("  AUCTION_CONTROL_KEY        Hex-encoded control key for signing");
    println!("  AUCTION_SLOT_SIZE_SATS     Slot output value (default: 550)");
    println!("  AUCTION_SPLIT_FEE_SATS     Split fee (default: 8000)");
    println!("  AUCTION_SHUTDOWN_FEE_SATS  Fee per shutdown step (default: 7700)");
    println!("  AUCTION_RESERVE_PRICE      open() reserve price (default: 1000000)");
    println!("  AUCTION_HEADER_COUNT       Headers after the confirming block (default: 6)");
    println!("  AUCTION_CONTRACT_ADDRESS   Settlement contract");
    println!("  AUCTION_LOG_LEVEL          Log filter (default: info)");
}

// ============================================================================
// Commands
// ============================================================================

fn run_split(config: &AuctionConfig, args: &[String]) -> Result<()> {
    let signer = control_signer(config)?;
    let builder = ChainBuilder::new(&signer, config.network.bitcoin_network());

    let slot_count: usize = parse_value(required(args, "--slots")?, "--slots")?;
    let params = SplitParams {
        funding: parse_prevout(required(args, "--funding")?)?,
        slot_count,
        slot_size: config.slot_size,
        fee: config.split_fee,
        change_address: parse_address(config, required(args, "--change")?)?,
    };

    let split = builder.build_split(&params)?;

    println!("Split txid: {}", split.signed.txid());
    println!("Change: {}", sats_to_display(split.change));
    for slot in &split.slots {
        println!("  slot {}", slot.outpoint);
    }
    println!();
    println!("{}", split.signed.to_hex());
    Ok(())
}

fn run_offers(config: &AuctionConfig, args: &[String]) -> Result<()> {
    let signer = control_signer(config)?;
    let builder = ChainBuilder::new(&signer, config.network.bitcoin_network());

    let slots = values(args, "--slot")
        .into_iter()
        .map(|s| {
            let (txid, vout) = parse_outpoint(s)?;
            Ok(Prevout::new(txid, vout, config.slot_size))
        })
        .collect::<Result<Vec<_>>>()?;

    let offers = values(args, "--offer")
        .into_iter()
        .map(|s| AuctionOffer::from_str(s).map_err(AuctionError::invalid_argument))
        .collect::<Result<Vec<_>>>()?;

    let params = OfferParams {
        slots,
        recipient: parse_address(config, required(args, "--recipient")?)?,
        schedule: OfferSchedule::new(offers)?,
    };

    for slot in builder.build_offers(&params)? {
        println!("Slot {} ({} offers)", slot.slot.outpoint, slot.offers.len());
        println!("{}", slot.partial_tx_hex());
        println!();
    }
    Ok(())
}

fn run_shutdown(config: &AuctionConfig, args: &[String]) -> Result<()> {
    let signer = control_signer(config)?;
    let builder = ChainBuilder::new(&signer, config.network.bitcoin_network());

    let unsold = required(args, "--unsold")?
        .split(',')
        .map(|i| parse_value(i.trim(), "--unsold"))
        .collect::<Result<Vec<u32>>>()?;

    let params = ShutdownParams {
        split_txid: parse_value(required(args, "--split")?, "--split")?,
        unsold,
        slot_size: config.slot_size,
        funding: parse_prevout(required(args, "--funding")?)?,
        fee: config.shutdown_fee,
        change_address: parse_address(config, required(args, "--change")?)?,
        settlement_address: parse_value(required(args, "--eth")?, "--eth")?,
    };

    let mut cascade = ShutdownCascade::new(params)?;
    for step in cascade.build_all(&builder)? {
        println!(
            "Step {}: {} -> {}{}",
            step.index,
            step.txid(),
            sats_to_display(step.output_value),
            if step.is_final { " (final)" } else { "" }
        );
        println!("{}", step.signed.to_hex());
        println!();
    }
    Ok(())
}

fn run_verify_proof(args: &[String]) -> Result<()> {
    let position: u32 = parse_value(required(args, "--position")?, "--position")?;
    let proof = MerkleProof::from_hex(required(args, "--proof")?, position)?;

    proof.check()?;
    println!("Proof valid: leaf at position {} ({} siblings)", position, proof.siblings.len());

    if let Some(headers) = value(args, "--headers") {
        let chain = HeaderChain::from_hex(headers)?;
        chain.verify_links()?;
        if chain.merkle_root(0) != Some(proof.root) {
            return Err(AuctionError::invalid_argument(
                "first header does not commit to the proof root",
            ));
        }
        println!("Header chain valid: {} headers", chain.len());
    }
    Ok(())
}

async fn run_settle(config: &AuctionConfig, args: &[String]) -> Result<()> {
    config.validate_for_mainnet()?;
    config.print_summary();
    println!();

    let start_nonce: u64 = parse_value(required(args, "--nonce")?, "--nonce")?;
    let txids = positional(args)
        .into_iter()
        .map(|t| parse_value::<Txid>(t, "txid"))
        .collect::<Result<Vec<_>>>()?;
    if txids.is_empty() {
        return Err(AuctionError::invalid_argument("no txids given"));
    }

    let source = EsploraClient::new(&config.esplora_url);
    let assembler = SettlementAssembler::new(
        CalldataEncoder::new(config.contract_address),
        config.header_count,
    );

    info!(count = txids.len(), start_nonce, "assembling claims");
    let calls = assembler.assemble_from_source(&source, &txids, start_nonce).await;
    print_calls(&calls);
    Ok(())
}

/// Walk through a whole auction with a throwaway key and fake funding
fn run_demo(config: &AuctionConfig) -> Result<()> {
    println!("=== Integral Auction Demo (regtest, offline) ===");
    println!();
    config.print_summary();
    println!();

    let signer = SingleKeySigner::from_seed(b"integral-auction-demo")?;
    let builder = ChainBuilder::new(&signer, bitcoin::Network::Regtest);
    let seller = builder.control_address();
    println!("Control key: {}", signer.public_key());
    println!("Seller address: {}", seller);
    println!();

    let schedule = OfferSchedule::from_pairs(&[(1000, 0), (900, 144), (800, 288)])?;
    let mut auction = AuctionChain::new(signer.public_key(), schedule);

    // 1. Split
    let funding = Prevout::new(Txid::from_byte_array([0x01; 32]), 0, Amount::from_sat(100_000));
    let split = auction.split(
        &builder,
        &SplitParams {
            funding,
            slot_count: 3,
            slot_size: config.slot_size,
            fee: config.split_fee,
            change_address: seller.clone(),
        },
    )?;
    println!("1. Split {} into {} slots", split.signed.txid(), split.slots.len());
    println!("   Change: {}", sats_to_display(split.change));

    // 2. Offers
    let offers = auction.offer(&builder, seller.clone())?;
    for slot in &offers {
        println!("2. Slot {}: {} offers signed", slot.slot.outpoint, slot.offers.len());
    }

    let terms = OpenTerms {
        reserve_price: U256::from(config.reserve_price),
        req_difficulty: U256::from(config.req_difficulty),
        asset: EthAddress::ZERO,
        value: U256::from(config.slot_size.to_sat()),
    };
    let assembler =
        SettlementAssembler::new(CalldataEncoder::new(config.contract_address), config.header_count);
    let opens = assembler.assemble_opens(&offers, &terms, 0);
    println!("   {} open() calls encoded", opens.iter().filter(|c| c.is_ok()).count());

    // 3. Slot 1 sells at the first price; prove it in a fake block
    let won = &offers[1].offers[0].signed;
    auction.mark_claimed(1)?;
    let block_txids = [
        [0xaa; 32],
        won.txid().to_byte_array(),
        [0xbb; 32],
        [0xcc; 32],
        [0xdd; 32],
    ];
    let proof = MerkleProof::from_block_txids(&block_txids, 1)?;
    println!("3. Slot 1 claimed in {}", won.txid());
    println!("   Proof position {} verifies: {}", proof.position, proof.verify());

    let header = integral_auction::proof::BlockHeader {
        version: 0x2000_0000,
        prev_block_hash: [0; 32],
        merkle_root: proof.root,
        timestamp: 1_700_000_000,
        bits: 0x207f_ffff,
        nonce: 0,
    };
    let claims = assembler.assemble_claims(
        &[ClaimInput {
            tx: won.serialize(),
            proof,
            headers: HeaderChain::new(vec![header]),
        }],
        opens.len() as u64,
    );
    print_calls(&claims);

    // 4. Reclaim the rest
    let running = Prevout::new(split.signed.txid(), 3, split.change);
    let steps = auction.reclaim(
        &builder,
        running,
        config.shutdown_fee,
        seller,
        EthAddress::repeat_byte(0x11),
    )?;
    for step in &steps {
        println!(
            "4. Shutdown step {} reclaims {} -> {}",
            step.index,
            step.slot.outpoint,
            sats_to_display(step.output_value)
        );
    }
    println!();
    println!("Final phase: {:?}", auction.phase());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn control_signer(config: &AuctionConfig) -> Result<SingleKeySigner> {
    let key = config.require_control_key()?;
    Ok(SingleKeySigner::from_material(&key)?)
}

fn print_calls(calls: &[SettlementCall]) {
    for call in calls {
        match &call.result {
            Ok(encoded) => println!(
                "  [{}] nonce {} -> {} 0x{}",
                call.index,
                encoded.nonce,
                encoded.to,
                hex::encode(&encoded.data)
            ),
            Err(e) => println!("  [{}] failed: {}", call.index, e),
        }
    }
}

fn value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .collect()
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    value(args, flag).ok_or_else(|| AuctionError::invalid_argument(format!("missing {}", flag)))
}

/// Arguments that are neither flags nor flag values
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i].starts_with("--") {
            i += 2;
        } else {
            out.push(args[i].as_str());
            i += 1;
        }
    }
    out
}

fn parse_value<T>(s: &str, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| AuctionError::invalid_argument(format!("{} {}: {}", what, s, e)))
}

fn parse_outpoint(s: &str) -> Result<(Txid, u32)> {
    let (txid, vout) = s
        .split_once(':')
        .ok_or_else(|| AuctionError::invalid_argument(format!("expected txid:vout, got {}", s)))?;
    Ok((parse_value(txid, "txid")?, parse_value(vout, "vout")?))
}

fn parse_prevout(s: &str) -> Result<Prevout> {
    let (outpoint, sats) = s.rsplit_once(':').ok_or_else(|| {
        AuctionError::invalid_argument(format!("expected txid:vout:sats, got {}", s))
    })?;
    let (txid, vout) = parse_outpoint(outpoint)?;
    let value = parse_sats(sats)
        .ok_or_else(|| AuctionError::invalid_argument(format!("invalid amount {}", sats)))?;
    Ok(Prevout::new(txid, vout, value))
}

fn parse_address(config: &AuctionConfig, s: &str) -> Result<Address> {
    Address::from_str(s)
        .map_err(|e| AuctionError::invalid_argument(format!("address {}: {}", s, e)))?
        .require_network(config.network.bitcoin_network())
        .map_err(|e| AuctionError::invalid_argument(format!("address {}: {}", s, e)))
}
