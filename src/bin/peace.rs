use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use peace_protocol::algebra::encoding::{
    decode_hex, point_from_hex, point_to_hex, scalar_from_hex, scalar_to_decimal, scalar_to_hex,
};
use peace_protocol::algebra::{hop_key, Bls12, G1, Scalar};
use peace_protocol::chain::datum::ToPlutusData;
use peace_protocol::chain::{ChainProvider, InMemoryChain};
use peace_protocol::hop::{HopCoordinator, HopRecord};
use peace_protocol::identity::{build_register, derive_secret_key, Ed25519Capability, Vkh};
use peace_protocol::marketplace::{BidSecrets, ListingSecrets, Marketplace};
use peace_protocol::snark::{EchoProver, HopWitness, TracingProgress};
use peace_protocol::store::InMemorySecretStore;
use peace_protocol::{ProtocolConfig, ProtocolGroup};

const LOG_TARGET: &str = "bin::peace";

#[derive(Debug, Parser)]
#[command(name = "peace")]
#[command(about = "Encrypted-secret marketplace protocol tools", long_about = None)]
struct Args {
    /// Toggle structured (JSON) logs
    #[arg(long, env = "PEACE_LOG_JSON", default_value_t = false)]
    json: bool,

    /// Root directory for stored secrets
    #[arg(long, env = "PEACE_SECRETS_DIR")]
    secrets_dir: Option<PathBuf>,

    /// Validity window of a submitted hop proof, in milliseconds
    #[arg(long, env = "PEACE_PROOF_TTL_MS")]
    proof_ttl_ms: Option<i64>,

    /// Store secrets in plaintext (tests and demos only)
    #[arg(long, env = "PEACE_PLAINTEXT_STORE", default_value_t = false)]
    plaintext_store: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Derive a register and Schnorr proof from an Ed25519 seed
    Register {
        /// 32-byte seed, hex
        #[arg(long, env = "PEACE_SEED")]
        seed: String,
    },
    /// Hop key and witness point for a hex scalar `a`
    HopKey {
        #[arg(long)]
        a: String,
    },
    /// The 36 public inputs for `(a, r)` against a bidder value `V`
    PublicInputs {
        #[arg(long)]
        a: String,
        #[arg(long)]
        r: String,
        /// Compressed G1 point, hex
        #[arg(long)]
        v: String,
    },
    /// List, bid, hop and decrypt against an in-memory ledger
    Demo {
        #[arg(long, default_value = "the location of the treasure")]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let config = build_config(&args)?;

    match args.command {
        Command::Register { seed } => register(&seed),
        Command::HopKey { a } => print_hop_key(&a),
        Command::PublicInputs { a, r, v } => print_public_inputs(&a, &r, &v),
        Command::Demo { payload } => demo(&config, payload.as_bytes()).await,
    }
}

fn load_dotenv() {
    let manifest_env_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<ProtocolConfig> {
    let mut config = ProtocolConfig::default();
    if let Some(dir) = &args.secrets_dir {
        config.secrets_dir = dir.clone();
    }
    if let Some(ttl) = args.proof_ttl_ms {
        config.proof_ttl_ms = ttl;
    }
    config.encrypt_store = !args.plaintext_store;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn parse_seed(seed: &str) -> Result<[u8; 32]> {
    let bytes = decode_hex(seed)?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("seed must be 32 bytes, got {}", b.len()))
}

fn register(seed: &str) -> Result<()> {
    let signer = Ed25519Capability::from_seed(&parse_seed(seed)?);
    let sk = derive_secret_key::<Scalar<Bls12>>(&signer)?;
    let (register, proof) = build_register::<Bls12, _>(&sk, Bls12::g1_generator(), &mut rand::thread_rng())?;
    let out = json!({
        "vkh": Vkh::of(&signer).to_string(),
        "register": register,
        "schnorr": proof,
        "register_datum": register.to_plutus_data().to_json_value()?,
        "schnorr_datum": proof.to_plutus_data().to_json_value()?,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_hop_key(a: &str) -> Result<()> {
    let a: Scalar<Bls12> = scalar_from_hex(a)?;
    let hk = hop_key::<Bls12>(&a);
    let out = json!({
        "hk": scalar_to_hex(&hk),
        "w0": point_to_hex(&(Bls12::g1_generator() * hk)),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_public_inputs(a: &str, r: &str, v: &str) -> Result<()> {
    let a: Scalar<Bls12> = scalar_from_hex(a)?;
    let r: Scalar<Bls12> = scalar_from_hex(r)?;
    let v: G1<Bls12> = point_from_hex(v)?;
    let witness = HopWitness::<Bls12>::compute(&a, &r, &v);
    let inputs: Vec<String> = witness.public_inputs(&v).iter().map(scalar_to_decimal).collect();
    let out = json!({
        "w0": point_to_hex(&witness.w0),
        "w1": point_to_hex(&witness.w1),
        "inputs": inputs,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn demo(config: &ProtocolConfig, payload: &[u8]) -> Result<()> {
    // Demo secrets never share a directory with real ones.
    let scratch = tempfile::tempdir().context("creating demo secrets directory")?;
    let config = ProtocolConfig {
        secrets_dir: scratch.path().to_path_buf(),
        ..config.clone()
    };
    info!(target: LOG_TARGET, dir = %scratch.path().display(), "demo secrets directory");

    let chain = InMemoryChain::<Bls12>::default();
    let seller_signer = Arc::new(Ed25519Capability::from_seed(&[1u8; 32]));
    let buyer_signer = Arc::new(Ed25519Capability::from_seed(&[2u8; 32]));

    let seller_bids = Arc::new(InMemorySecretStore::<BidSecrets<Bls12>>::new());
    let seller = Marketplace::new(
        Arc::new(chain.clone()),
        seller_signer.clone(),
        config.open_store::<ListingSecrets<Bls12>>(seller_signer.as_ref())?,
        seller_bids.clone(),
    );
    let hops = HopCoordinator::new(
        Arc::new(chain.clone()),
        config.open_store::<HopRecord<Bls12>>(seller_signer.as_ref())?,
        seller_bids,
        Arc::new(EchoProver::default()),
        seller_signer,
        config.proof_ttl_ms,
    );
    let buyer = Marketplace::new(
        Arc::new(chain.clone()),
        buyer_signer,
        Arc::new(InMemorySecretStore::<ListingSecrets<Bls12>>::new()),
        Arc::new(InMemorySecretStore::<BidSecrets<Bls12>>::new()),
    );

    let (token, _) = seller.create_listing(payload).await?;
    info!(target: LOG_TARGET, %token, "listed");
    let (bid, _) = buyer.place_bid(&token, 10_000_000).await?;
    info!(target: LOG_TARGET, %bid, "bid placed");

    hops.prepare_hop(&token, &bid).await?;
    let proof = hops.generate_proof(&token, &TracingProgress).await?;
    hops.submit_proof(&token, proof).await?;
    hops.finish_hop(&token).await?;

    let opened = buyer.open_listing(&token).await?;
    if opened != payload {
        return Err(anyhow!("buyer decrypted a different payload"));
    }
    let record = chain
        .fetch_encryption(&token)
        .await?
        .ok_or_else(|| anyhow!("listing {token} disappeared"))?;
    for submission in chain.submissions() {
        for (purpose, redeemer) in &submission.redeemers {
            println!(
                "{} {} redeemer: {}",
                submission.id,
                purpose.as_str(),
                redeemer.to_json_string()
            );
        }
    }
    println!("{}", record.to_plutus_data().to_json_string());
    info!(
        target: LOG_TARGET,
        %token,
        payload = %String::from_utf8_lossy(&opened),
        "buyer opened the listing"
    );
    Ok(())
}
