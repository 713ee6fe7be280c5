//! Error types for smart-account construction and signing

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Result type alias for smart-account operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers to decide between
/// retrying, changing strategy, or aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed hex, DER, CBOR, ABI or wrong-length input
    Decoding,
    /// Missing owner, unsupported entry point, missing chain id, bad call shape
    Configuration,
    /// Authenticator ceremony failed, signer not owner, permission not installed
    Signer,
    /// Account or module is not in the state the query requires
    State,
    /// Failure reported by an external collaborator (bundler, node, storage)
    External,
}

/// Errors that can occur while building or signing user operations
#[derive(Debug, Error)]
pub enum Error {
    // ============ Decoding Errors ============
    /// Input is not valid hex
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    /// Input has the wrong byte length
    #[error("Invalid length for {field}: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Numeric value does not fit the packed slot it is destined for
    #[error("Value of {field} does not fit in {bits} bits")]
    ValueOverflow { field: &'static str, bits: u32 },

    /// DER-encoded ECDSA signature is malformed
    #[error("Malformed DER in {field}: {reason}")]
    InvalidDer { field: &'static str, reason: String },

    /// CBOR attestation object or COSE key is malformed
    #[error("Malformed CBOR in {field}: {reason}")]
    InvalidCbor { field: &'static str, reason: String },

    /// WebAuthn client data JSON does not have the expected shape
    #[error("Malformed client data in {field}: {reason}")]
    InvalidClientData { field: &'static str, reason: String },

    /// Public key is not a valid curve point
    #[error("Invalid public key in {field}: {reason}")]
    InvalidPublicKey { field: &'static str, reason: String },

    /// ABI decoding failed
    #[error("ABI decoding error in {field}: {reason}")]
    Abi { field: &'static str, reason: String },

    /// Wallet RPC request has an unknown method or malformed params
    #[error("Invalid wallet request: {0}")]
    InvalidRequest(String),

    // ============ Configuration Errors ============
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Neither an ECDSA owner nor passkey coordinates were supplied
    #[error("Account has no owner: supply an ECDSA owner address or passkey coordinates")]
    MissingOwner,

    /// Threshold is zero or exceeds the number of owners
    #[error("Invalid threshold {threshold} for {owners} owner(s)")]
    InvalidThreshold { threshold: u64, owners: usize },

    /// Entry point version not supported
    #[error("Unsupported entry point version: {0}")]
    UnsupportedEntryPoint(String),

    /// Chain id is required but was not configured
    #[error("Chain id is not configured")]
    MissingChainId,

    /// No calls to encode
    #[error("Nothing to execute: call list is empty")]
    EmptyExecution,

    /// Call count is not allowed by the requested execution mode
    #[error("Execution mode {mode} cannot encode {calls} calls")]
    ExecutionModeMismatch { mode: &'static str, calls: usize },

    // ============ Signer Errors ============
    /// The signer does not control the address it was asked to sign for
    #[error("Cannot sign for address {requested}: signer is {signer}")]
    CannotSignForAddress { requested: Address, signer: Address },

    /// Platform authenticator returned no assertion, failed, timed out or was cancelled
    #[error("Passkey signature failed: {0}")]
    PasskeySignatureFailed(String),

    /// Smart-session permission is not installed on the account
    #[error("Permission {0} is not installed on the account")]
    PermissionNotInstalled(B256),

    /// The signer variant does not support this operation
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    // ============ State Errors ============
    /// Account has no code on chain
    #[error("Account {0} is not deployed")]
    AccountNotDeployed(Address),

    /// Module is not installed on the account
    #[error("Module {0} is not installed")]
    ModuleNotInstalled(Address),

    // ============ External Errors ============
    /// Bundler or paymaster collaborator failed
    #[error("Bundler error: {0}")]
    Bundler(String),

    /// Chain node collaborator failed
    #[error("Chain error: {0}")]
    Chain(String),

    /// Credential store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encryption or decryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHex { .. }
            | Error::InvalidLength { .. }
            | Error::ValueOverflow { .. }
            | Error::InvalidDer { .. }
            | Error::InvalidCbor { .. }
            | Error::InvalidClientData { .. }
            | Error::InvalidPublicKey { .. }
            | Error::Abi { .. }
            | Error::InvalidRequest(_) => ErrorKind::Decoding,

            Error::InvalidConfig(_)
            | Error::MissingOwner
            | Error::InvalidThreshold { .. }
            | Error::UnsupportedEntryPoint(_)
            | Error::MissingChainId
            | Error::EmptyExecution
            | Error::ExecutionModeMismatch { .. } => ErrorKind::Configuration,

            Error::CannotSignForAddress { .. }
            | Error::PasskeySignatureFailed(_)
            | Error::PermissionNotInstalled(_)
            | Error::NotSupported(_)
            | Error::Crypto(_) => ErrorKind::Signer,

            Error::AccountNotDeployed(_) | Error::ModuleNotInstalled(_) => ErrorKind::State,

            Error::Bundler(_)
            | Error::Chain(_)
            | Error::Storage(_)
            | Error::Encryption(_)
            | Error::Serialization(_) => ErrorKind::External,
        }
    }

    /// ABI decoding failure of `field`
    pub fn abi(field: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Abi {
            field,
            reason: err.to_string(),
        }
    }

    /// Offending input of a decoding error
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Error::InvalidHex { field, .. }
            | Error::InvalidLength { field, .. }
            | Error::ValueOverflow { field, .. }
            | Error::InvalidDer { field, .. }
            | Error::InvalidCbor { field, .. }
            | Error::InvalidClientData { field, .. }
            | Error::InvalidPublicKey { field, .. }
            | Error::Abi { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Whether a fresh attempt with the same inputs may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Signer | ErrorKind::External)
            && !matches!(self, Error::NotSupported(_) | Error::CannotSignForAddress { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
