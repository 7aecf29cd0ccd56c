use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use ledger_endorser::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "endorser-cli")]
#[command(about = "Ledger Endorser CLI - identities, signed proposals and endorsement checks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a signing identity (random, or derived from a seed)
    GenerateKey {
        /// Hex-encoded seed material for deterministic derivation
        #[arg(long)]
        seed: Option<String>,

        /// Label separating identities derived from the same seed
        #[arg(long, default_value = "peer")]
        label: String,
    },

    /// Build and sign a chaincode invocation proposal
    SignProposal {
        /// Hex-encoded secret key of the submitting client
        #[arg(short, long)]
        secret: String,

        /// Channel id; empty for chainless proposals
        #[arg(short, long, default_value = "")]
        channel: String,

        /// Chaincode name
        #[arg(long)]
        chaincode: String,

        /// Chaincode type
        #[arg(long, default_value = "golang")]
        chaincode_type: String,

        /// Invocation arguments, function name first
        #[arg(short, long, num_args = 1..)]
        args: Vec<String>,

        /// Transient data entries as key=value
        #[arg(short, long)]
        transient: Vec<String>,
    },

    /// Check the endorsement on a serialized proposal response
    VerifyResponse {
        /// Hex-encoded proposal response
        #[arg(short, long)]
        response: String,
    },

    /// Print the effective endorser configuration
    ShowConfig {
        /// Path to endorser.toml (defaults are used if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::GenerateKey { seed, label } => handle_generate_key(seed, label),
        Commands::SignProposal {
            secret,
            channel,
            chaincode,
            chaincode_type,
            args,
            transient,
        } => handle_sign_proposal(secret, channel, chaincode, chaincode_type, args, transient),
        Commands::VerifyResponse { response } => handle_verify_response(response),
        Commands::ShowConfig { config } => handle_show_config(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn handle_generate_key(seed: Option<String>, label: String) -> anyhow::Result<()> {
    let signer = match seed {
        Some(seed) => {
            let seed = hex::decode(seed.trim()).context("seed must be hex")?;
            LocalSigner::from_seed(&seed, &label)?
        }
        None => LocalSigner::generate(),
    };

    println!("Secret: {}", signer.secret_hex());
    println!("Identity: {}", hex::encode(signer.identity()));

    Ok(())
}

fn parse_chaincode_type(s: &str) -> anyhow::Result<ChaincodeType> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| anyhow!("unknown chaincode type '{}'", s))
}

fn parse_transient(entries: &[String]) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("transient entry '{}' must be key=value", entry))?;
        if key.is_empty() {
            bail!("transient entry '{}' has an empty key", entry);
        }
        map.insert(key.to_string(), value.as_bytes().to_vec());
    }
    Ok(map)
}

fn handle_sign_proposal(
    secret: String,
    channel: String,
    chaincode: String,
    chaincode_type: String,
    args: Vec<String>,
    transient: Vec<String>,
) -> anyhow::Result<()> {
    let signer = LocalSigner::from_secret_hex(&secret)?;
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let spec = ChaincodeInvocationSpec::new(
        parse_chaincode_type(&chaincode_type)?,
        ChaincodeId::named(&chaincode),
        ChaincodeInput::from_strs(&arg_refs),
    );

    let transient = parse_transient(&transient)?;
    let (signed, tx_id) = create_signed_proposal(&signer, &channel, &spec, transient)?;
    debug!(tx_id = %tx_id, channel = %channel, chaincode = %chaincode, "proposal signed");

    println!("TxID: {}", tx_id);
    println!("SignedProposal: {}", hex::encode(marshal(&signed)?));

    Ok(())
}

fn handle_verify_response(response: String) -> anyhow::Result<()> {
    let bytes = hex::decode(response.trim()).context("response must be hex")?;
    let response: ProposalResponse = unmarshal(&bytes)?;

    println!("Status: {}", response.response.status);
    if !response.response.message.is_empty() {
        println!("Message: {}", response.response.message);
    }

    let Some(endorsement) = &response.endorsement else {
        bail!("response carries no endorsement");
    };
    if !response.verify_endorsement()? {
        bail!("endorsement signature is invalid");
    }

    let action = response.chaincode_action()?;
    println!("Endorser: {}", hex::encode(&endorsement.endorser));
    println!("Chaincode: {}", action.chaincode_id);
    println!("Valid: true");

    Ok(())
}

fn handle_show_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => EndorserConfig::load(&path)?,
        None => EndorserConfig::default(),
    };
    print!("{}", config.to_toml_string()?);
    Ok(())
}
