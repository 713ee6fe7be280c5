//! # Safe Wallet Core
//!
//! Construction and signing engine for Safe smart accounts operated through
//! ERC-4337 (entry points v0.6 and v0.7), optionally extended with ERC-7579
//! modules and smart-session permissions.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **User operations**: field model, v0.7 packing, hashing and JSON-RPC shape
//! - **Address prediction**: counterfactual CREATE2 addresses of Safe proxies
//! - **Execution encoding**: ERC-7579 `execute` modes and Safe4337Module calls
//! - **Signers**: ECDSA owners, WebAuthn passkeys and smart-session keys
//! - **WebAuthn codec**: assertion decoding, DER parsing, COSE key extraction
//! - **Smart sessions**: session construction, permission ids, nonce keys
//! - **Collaborators**: chain reader, bundler and paymaster traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use safe_wallet_core::{
//!     InitializerParams, SafeAccountConfig, SmartAccount, SmartAccountClient,
//!     signer::EcdsaSigner, types::Call,
//! };
//!
//! let owner = EcdsaSigner::from_hex(&key)?;
//! let config = SafeAccountConfig::v07().with_chain_id(8453u64);
//! let account = SmartAccount::counterfactual(
//!     config,
//!     &InitializerParams::single_owner(owner.address()),
//!     U256::ZERO,
//! )?;
//!
//! let client = SmartAccountClient::new(account, owner, reader, bundler);
//! let hash = client.send_calls(&[Call::transfer(to, value)]).await?;
//! let receipt = client.wait_for_receipt(hash, Duration::from_secs(60)).await?;
//! ```
//!
//! Network transport, key custody and gas policy live behind the traits in
//! [`chain`]; this crate never opens a connection itself.

pub mod account;
pub mod chain;
pub mod client;
pub mod config;
pub mod contracts;
pub mod error;
pub mod execution;
pub mod rpc;
pub mod session;
pub mod signature;
pub mod signer;
pub mod storage;
pub mod types;
pub mod user_op;
pub mod webauthn;

pub use account::{AccountState, InitializerParams, SmartAccount, try_get_on_chain_state};
pub use chain::{BundlerClient, ChainStateReader, PaymasterClient, UserOperationReceipt};
pub use client::SmartAccountClient;
pub use config::{EntryPointVersion, SafeAccountConfig};
pub use error::{Error, ErrorKind, Result};
pub use rpc::{WalletRpcHandler, WalletRpcMethod};
pub use session::{SessionMode, SessionParams};
pub use signature::ValidityWindow;
pub use signer::{AccountSigner, Signer, SignerKind, SigningContext};
pub use storage::{CredentialStore, MemoryCredentialStore};
pub use types::{Call, ChainId, Signature};
pub use user_op::{SignedUserOperation, UserOperation};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
