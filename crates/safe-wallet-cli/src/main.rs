//! Safe Wallet CLI
//!
//! Offline tooling for Safe smart accounts: address prediction, user
//! operation hashes and smart-session identifiers.

use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use safe_wallet_core::{
    EntryPointVersion, InitializerParams, SafeAccountConfig, SessionParams, SmartAccount,
    UserOperation,
    session::{AccountType, build_session, derive_nonce_key, derive_permission_id},
    signer::EcdsaSigner,
};
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "safe-wallet")]
#[command(about = "Safe smart account CLI", version)]
struct Cli {
    /// Entry point version (v0.6 or v0.7)
    #[arg(long, global = true, default_value = "v0.7", env = "SAFE_ENTRY_POINT")]
    entry_point: EntryPointVersion,

    /// Chain id
    #[arg(long, global = true, default_value_t = 1, env = "SAFE_CHAIN_ID")]
    chain_id: u64,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show versions and canonical contract addresses
    Info,

    /// Generate a random ECDSA owner key
    GenerateKey {
        /// Also print the private key
        #[arg(long)]
        show_secret: bool,
    },

    /// Predict the counterfactual address of a Safe
    PredictAddress {
        /// Owner address, repeatable
        #[arg(short, long = "owner", required = true)]
        owners: Vec<Address>,

        /// Signature threshold
        #[arg(short, long, default_value_t = 1)]
        threshold: u64,

        /// CREATE2 salt nonce
        #[arg(short, long, default_value = "0")]
        salt: U256,

        /// Install the Safe7579 adapter
        #[arg(long)]
        erc7579: bool,
    },

    /// Hash an unsigned user operation
    UserOpHash {
        #[arg(long)]
        sender: Address,

        #[arg(long, default_value = "0")]
        nonce: U256,

        /// Account calldata, hex
        #[arg(long, default_value = "0x")]
        call_data: Bytes,

        #[arg(long, default_value_t = 0)]
        call_gas: u64,

        #[arg(long, default_value_t = 0)]
        verification_gas: u64,

        #[arg(long, default_value_t = 0)]
        pre_verification_gas: u64,

        #[arg(long, default_value_t = 0)]
        max_fee: u128,

        #[arg(long, default_value_t = 0)]
        max_priority_fee: u128,
    },

    /// Derive the smart-session permission id for a session key
    PermissionId {
        #[arg(long)]
        session_key: Address,

        /// Session salt; random when omitted
        #[arg(long)]
        salt: Option<B256>,

        #[arg(long, default_value_t = 0)]
        valid_after: u64,

        #[arg(long)]
        valid_until: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = preset(cli.entry_point).with_chain_id(cli.chain_id);
    debug!(entry_point = %config.entry_point_version, chain_id = cli.chain_id, "loaded preset");

    let output = match cli.command {
        Commands::Info => show_info(),
        Commands::GenerateKey { show_secret } => generate_key(show_secret),
        Commands::PredictAddress {
            owners,
            threshold,
            salt,
            erc7579,
        } => predict(config.with_erc7579(erc7579), owners, threshold, salt)?,
        Commands::UserOpHash {
            sender,
            nonce,
            call_data,
            call_gas,
            verification_gas,
            pre_verification_gas,
            max_fee,
            max_priority_fee,
        } => {
            let op = UserOperation::new(sender, nonce, call_data)
                .with_gas_limits(call_gas, verification_gas, pre_verification_gas)
                .with_gas_prices(max_fee, max_priority_fee);
            user_op_hash(&config, &op)?
        }
        Commands::PermissionId {
            session_key,
            salt,
            valid_after,
            valid_until,
        } => {
            let mut params = SessionParams::for_key(session_key).with_validity(valid_after, valid_until);
            if let Some(salt) = salt {
                params = params.with_salt(salt);
            }
            permission_id(&config.with_erc7579(true), &params)?
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let Some(fields) = output.as_object() {
        for (name, value) in fields {
            match value {
                serde_json::Value::String(s) => println!("{name}: {s}"),
                other => println!("{name}: {other}"),
            }
        }
    }
    Ok(())
}

fn preset(version: EntryPointVersion) -> SafeAccountConfig {
    match version {
        EntryPointVersion::V06 => SafeAccountConfig::v06(),
        EntryPointVersion::V07 => SafeAccountConfig::v07(),
    }
}

fn show_info() -> serde_json::Value {
    let v06 = SafeAccountConfig::v06();
    let v07 = SafeAccountConfig::v07();
    serde_json::json!({
        "version": safe_wallet_core::VERSION,
        "singleton": v07.safe_singleton.to_string(),
        "proxyFactory": v07.proxy_factory.to_string(),
        "entryPointV06": v06.entry_point.to_string(),
        "entryPointV07": v07.entry_point.to_string(),
        "safe4337ModuleV06": v06.safe_4337_module.to_string(),
        "safe4337ModuleV07": v07.safe_4337_module.to_string(),
        "webauthnSharedSigner": v07.webauthn_shared_signer.to_string(),
        "smartSessions": v07.smart_sessions.to_string(),
    })
}

fn generate_key(show_secret: bool) -> serde_json::Value {
    let signer = EcdsaSigner::random();
    info!(address = %signer.address(), "generated owner key");
    let mut out = serde_json::json!({ "address": signer.address().to_string() });
    if show_secret {
        out["privateKey"] = format!("0x{}", hex::encode(signer.to_bytes())).into();
    }
    out
}

fn predict(
    config: SafeAccountConfig,
    owners: Vec<Address>,
    threshold: u64,
    salt: U256,
) -> Result<serde_json::Value> {
    if owners.is_empty() {
        bail!("at least one owner is required");
    }
    let params = InitializerParams {
        owners,
        threshold,
        ..Default::default()
    };
    let account = SmartAccount::counterfactual(config, &params, salt)
        .context("failed to build Safe setup")?;
    Ok(serde_json::json!({
        "address": account.address().to_string(),
        "saltNonce": salt.to_string(),
        "initializer": account.initializer().encode().to_string(),
    }))
}

fn user_op_hash(config: &SafeAccountConfig, op: &UserOperation) -> Result<serde_json::Value> {
    let chain_id = config.chain_id()?;
    let hash = op.hash(config.entry_point_version, config.entry_point, chain_id)?;
    Ok(serde_json::json!({
        "userOpHash": hash.to_string(),
        "entryPoint": config.entry_point.to_string(),
        "chainId": chain_id.0,
    }))
}

fn permission_id(config: &SafeAccountConfig, params: &SessionParams) -> Result<serde_json::Value> {
    let session = build_session(config, params).context("invalid session parameters")?;
    Ok(serde_json::json!({
        "permissionId": derive_permission_id(&session).to_string(),
        "salt": session.salt.to_string(),
        "nonceKey": format!("{:#x}", derive_nonce_key(AccountType::Safe, config.smart_sessions)),
    }))
}
