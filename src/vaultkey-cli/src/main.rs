//! vaultkey - command-line front end for the vaultkey key provider.
//!
//! Generates hardware-bound signing keys, signs data and manages certificate
//! chains on the best store the host offers.
//!
//! ## Usage
//!
//! ```bash
//! # Show the detected store
//! vaultkey info
//!
//! # Full flow: generate, attest, sign "Foo", verify, chain round trip
//! vaultkey demo --attest --biometric-timeout 10 --emulated
//!
//! # Individual steps (persist across runs with the keyring-storage feature)
//! vaultkey generate --alias Bartschlüssel --algorithm ES384
//! vaultkey sign --alias Bartschlüssel --data Foo
//! vaultkey chain store --alias BartschlüsselCRT_CHAIN 3082... 3082...
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vaultkey_crypto::{random_bytes, verify, SignatureAlgorithm};
use vaultkey_keyring::{
    create_platform_store, verify_statement_chain, EmulatedHardwareStore, KeyGenRequest,
    KeyProvider, PlatformCapabilities, PromptPresenter, PromptRequest, PromptResponder,
    ProviderConfig, SecureStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_ALIAS: &str = "Bartschlüssel";
const DEFAULT_CHAIN_ALIAS: &str = "BartschlüsselCRT_CHAIN";

/// Hardware-bound signing keys from the command line.
#[derive(Parser)]
#[command(name = "vaultkey")]
#[command(version = VERSION)]
#[command(about = "Hardware-bound signing keys with biometric authentication windows")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Provider configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-process emulated hardware keystore instead of the platform store
    #[arg(long, global = true)]
    emulated: bool,

    /// Fail instead of falling back to the software store
    #[arg(long, global = true)]
    require_hardware: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected store and its capabilities
    Info,

    /// Generate a key, sign "Foo", verify and round-trip a certificate chain
    Demo {
        /// Signature algorithm (ES256, ES384, ES512)
        #[arg(short, long, default_value = "ES256")]
        algorithm: SignatureAlgorithm,

        /// Request key attestation with a random 16-byte challenge
        #[arg(long)]
        attest: bool,

        /// Seconds an authentication stays valid (0 for every use; omit for no authentication)
        #[arg(short, long, value_parser = parse_timeout)]
        biometric_timeout: Option<Duration>,
    },

    /// Generate (or replace) a key
    Generate {
        /// Key alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,

        /// Signature algorithm (ES256, ES384, ES512)
        #[arg(short, long, default_value = "ES256")]
        algorithm: SignatureAlgorithm,

        /// Hex attestation challenge ("random" for 16 random bytes)
        #[arg(long)]
        challenge: Option<String>,

        /// Seconds an authentication stays valid (0 for every use; omit for no authentication)
        #[arg(short, long, value_parser = parse_timeout)]
        biometric_timeout: Option<Duration>,
    },

    /// Sign data with an existing key
    Sign {
        /// Key alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,

        /// Data to sign (UTF-8)
        #[arg(short, long, default_value = "Foo")]
        data: String,

        /// Print the DER encoding instead of raw r||s
        #[arg(long)]
        der: bool,
    },

    /// Print the public key of an existing key
    PublicKey {
        /// Key alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,

        /// Print SubjectPublicKeyInfo DER instead of the SEC1 point
        #[arg(long)]
        spki: bool,
    },

    /// Delete a key (succeeds if absent)
    Delete {
        /// Key alias
        #[arg(long, default_value = DEFAULT_ALIAS)]
        alias: String,
    },

    /// Store or show a certificate chain
    Chain {
        #[command(subcommand)]
        action: ChainAction,
    },
}

#[derive(Subcommand)]
enum ChainAction {
    /// Store a chain, leaf first
    Store {
        /// Chain alias
        #[arg(long, default_value = DEFAULT_CHAIN_ALIAS)]
        alias: String,

        /// Hex-encoded certificates, leaf first
        certificates: Vec<String>,
    },

    /// Print a stored chain
    Show {
        /// Chain alias
        #[arg(long, default_value = DEFAULT_CHAIN_ALIAS)]
        alias: String,
    },
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("expected whole seconds, got {value:?}"))
}

/// Asks on the terminal. Answers "y" to authenticate.
#[derive(Debug)]
struct ConsolePresenter;

impl PromptPresenter for ConsolePresenter {
    fn present(&self, request: PromptRequest, responder: PromptResponder) {
        std::thread::spawn(move || {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(
                stderr,
                "\n{}\n{} [{}] ({:?}, reusable {}s)\nAuthenticate? [y/N] ",
                request.title,
                request.subtitle,
                request.alias,
                request.strength,
                request.reuse_seconds
            );
            let _ = stderr.flush();

            let mut answer = String::new();
            match std::io::stdin().lock().read_line(&mut answer) {
                Ok(_) if answer.trim().eq_ignore_ascii_case("y") => responder.succeed(),
                Ok(0) | Err(_) => drop(responder),
                Ok(_) => responder.cancel(),
            }
        });
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ProviderConfig> {
    let Some(path) = path else {
        return Ok(ProviderConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(ProviderConfig::from_json(&json)?)
}

fn open_provider(cli: &Cli) -> anyhow::Result<KeyProvider> {
    let config = load_config(cli.config.as_ref())?;
    tracing::debug!(emulated = cli.emulated, require_hardware = cli.require_hardware, "Opening key provider");
    let store: Arc<dyn SecureStore> = if cli.emulated {
        Arc::new(EmulatedHardwareStore::new(PlatformCapabilities::hardware_keystore())?)
    } else {
        create_platform_store(cli.require_hardware)?
    };
    Ok(KeyProvider::new(store, Some(Arc::new(ConsolePresenter)), config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --verbose.
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let provider = open_provider(&cli)?;

    match cli.command {
        Commands::Info => info(&provider),
        Commands::Demo {
            algorithm,
            attest,
            biometric_timeout,
        } => demo(&provider, algorithm, attest, biometric_timeout).await,
        Commands::Generate {
            alias,
            algorithm,
            challenge,
            biometric_timeout,
        } => {
            let mut request = KeyGenRequest::new(algorithm);
            request.biometric_timeout = biometric_timeout;
            request.attestation_challenge = match challenge.as_deref() {
                None => None,
                Some("random") => Some(random_bytes(16)),
                Some(hex_challenge) => Some(hex::decode(hex_challenge).context("challenge is not hex")?),
            };

            let key = provider.generate_key(&alias, &request).await?;
            println!("alias:      {}", key.key_pair.alias());
            println!("algorithm:  {}", key.key_pair.algorithm());
            println!("public key: {}", hex::encode(key.key_pair.public_key().sec1_bytes()));
            for (i, entry) in key.attestation_chain.iter().enumerate() {
                println!("chain[{i}]:   {}", hex::encode(entry));
            }
            Ok(())
        },
        Commands::Sign { alias, data, der } => {
            let key = provider.get_key_pair(&alias, &provider.platform_ops()).await?;
            let signature = provider
                .sign(data.as_bytes(), &key, key.algorithm())
                .await?;
            if der {
                println!("{}", hex::encode(signature.to_der()?));
            } else {
                println!("{}", hex::encode(signature.as_bytes()));
            }
            Ok(())
        },
        Commands::PublicKey { alias, spki } => {
            let public_key = provider.get_public_key(&alias).await?;
            if spki {
                println!("{}", hex::encode(public_key.to_spki_der()?));
            } else {
                println!("{}", hex::encode(public_key.sec1_bytes()));
            }
            Ok(())
        },
        Commands::Delete { alias } => {
            provider.delete_key(&alias, &provider.platform_ops()).await?;
            println!("deleted {alias}");
            Ok(())
        },
        Commands::Chain { action } => match action {
            ChainAction::Store {
                alias,
                certificates,
            } => {
                let chain = certificates
                    .iter()
                    .map(hex::decode)
                    .collect::<Result<Vec<_>, _>>()
                    .context("certificate is not hex")?;
                provider.store_certificate_chain(&alias, &chain).await?;
                println!("stored {} certificate(s) under {alias}", chain.len());
                Ok(())
            },
            ChainAction::Show { alias } => {
                for entry in provider.get_certificate_chain(&alias).await? {
                    println!("{}", hex::encode(entry));
                }
                Ok(())
            },
        },
    }
}

fn info(provider: &KeyProvider) -> anyhow::Result<()> {
    let caps = provider.capabilities();
    let report = serde_json::json!({
        "version": VERSION,
        "backend": caps.backend.to_string(),
        "security_level": caps.backend.security_level(),
        "has_hardware": caps.has_hardware,
        "strong_biometrics": caps.strong_biometrics,
        "weak_biometrics": caps.weak_biometrics,
        "device_credential": caps.device_credential,
        "strongbox": caps.strongbox,
        "attestation": caps.attestation,
        "user_auth": caps.supports_user_auth(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn demo(
    provider: &KeyProvider,
    algorithm: SignatureAlgorithm,
    attest: bool,
    biometric_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let challenge = attest.then(|| random_bytes(16));
    let mut request = KeyGenRequest::new(algorithm);
    request.attestation_challenge = challenge.clone();
    request.biometric_timeout = biometric_timeout;

    let key = provider.generate_key(DEFAULT_ALIAS, &request).await?;
    println!("backend:    {}", provider.backend());
    println!("public key: {}", hex::encode(key.key_pair.public_key().sec1_bytes()));

    if let Some(challenge) = &challenge {
        let statement = verify_statement_chain(&key.attestation_chain, challenge)
            .context("attestation does not verify")?;
        println!(
            "attested:   {} entries, issued {}",
            key.attestation_chain.len(),
            statement.issued_at
        );
    } else {
        println!("attested:   no");
    }

    let signature = provider.sign(b"Foo", &key.key_pair, algorithm).await?;
    let valid = verify(key.key_pair.public_key(), b"Foo", &signature)?;
    println!("signature:  {}", hex::encode(signature.as_bytes()));
    println!("verified:   {valid}");

    provider
        .store_certificate_chain(DEFAULT_CHAIN_ALIAS, &key.attestation_chain)
        .await?;
    let loaded = provider.get_certificate_chain(DEFAULT_CHAIN_ALIAS).await?;
    println!(
        "chain:      stored {} / loaded {} ({})",
        key.attestation_chain.len(),
        loaded.len(),
        if loaded == key.attestation_chain { "identical" } else { "MISMATCH" }
    );

    anyhow::ensure!(valid, "signature did not verify");
    anyhow::ensure!(loaded == key.attestation_chain, "certificate chain changed in storage");
    Ok(())
}
