//! sigtool: typed-data hashing, local signing and signature verification
//! from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use signing_engine::agent::LocalKeyAgent;
use signing_engine::eip712::{get_pre_image, TypedData, TypedDataSigner};
use signing_engine::verification::{SignatureAlgorithm, SignatureVerifier, VerificationRequest};
use signing_engine::TypedDataSigningRequest;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sigtool")]
#[command(about = "Hash EIP-712 typed data and verify signatures")]
struct Args {
    /// Print debug logs to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the EIP-712 signing digest of a typed-data document
    HashTypedData {
        /// JSON file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Print domain separator, struct hash and digest as JSON
        #[arg(long)]
        pre_image: bool,
    },

    /// Sign typed data with a local key and print the response as JSON
    SignTypedData {
        /// Hex secp256k1 secret key
        #[arg(long)]
        key: String,

        /// JSON file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Verify a signature and print the result as JSON
    Verify {
        /// Text message or 0x-prefixed 32-byte digest
        #[arg(short, long)]
        message: String,

        /// 0x-prefixed signature
        #[arg(short, long)]
        signature: String,

        /// Public key, or an address for ECDSA
        #[arg(short, long)]
        public_key: String,

        #[arg(short, long, default_value = "ecdsa")]
        algorithm: SignatureAlgorithm,
    },
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).context("reading stdin")?;
            Ok(buffer)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        signing_engine::utils::logging::enable_debug();
    }

    match args.command {
        Command::HashTypedData { file, pre_image } => {
            let typed_data = TypedData::from_json(&read_input(file.as_ref())?)?;
            let hashes = get_pre_image(&typed_data)?;
            if pre_image {
                println!("{}", serde_json::to_string_pretty(&hashes)?);
            } else {
                println!("0x{}", hex::encode(hashes.final_hash));
            }
        }

        Command::SignTypedData { key, file } => {
            let typed_data = TypedData::from_json(&read_input(file.as_ref())?)?;
            let agent = Arc::new(LocalKeyAgent::from_hex(&key)?);
            let request = TypedDataSigningRequest {
                id: "sigtool".to_string(),
                chain_id: "local".to_string(),
                topic: "local".to_string(),
                account: agent.address(),
                typed_data,
            };

            let response = TypedDataSigner::new(agent).sign_typed_data(&request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Verify {
            message,
            signature,
            public_key,
            algorithm,
        } => {
            let verifier = SignatureVerifier::new();
            let request = VerificationRequest::new(&message, &signature, &public_key, algorithm);
            let result = verifier.verify(&request)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_valid {
                bail!("signature is not valid");
            }
        }
    }

    Ok(())
}
