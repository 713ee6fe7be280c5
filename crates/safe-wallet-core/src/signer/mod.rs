//! # Account Signers
//!
//! Three interchangeable ways to authorize a Safe user operation:
//!
//! | Signer | Owner on the Safe | User-op signature |
//! |--------|-------------------|-------------------|
//! | [`EcdsaSigner`] | EOA address | `window || r || s || v` |
//! | [`PasskeySigner`] | WebAuthn shared signer | `window || contract signature` |
//! | [`SmartSessionSigner`] | none, validated by smart sessions | `0x00 || permissionId || sig` |
//!
//! Every signer can also produce a stub signature of the same byte length
//! as its real one, which bundlers need for gas estimation.
//!
//! [`AccountSigner`] is the closed union callers hold; it dispatches to the
//! variant with a `match`.

mod ecdsa;
mod passkey;
mod session;

pub use ecdsa::{EcdsaSigner, recover_address};
pub use passkey::{PasskeySigner, PlatformAuthenticator};
pub use session::SmartSessionSigner;

use crate::config::SafeAccountConfig;
use crate::signature::ValidityWindow;
use crate::user_op::{SignedUserOperation, UserOperation};
use crate::{Error, Result};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Bytes, U256, hex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fixed ECDSA signature used for gas estimation
///
/// `r = 0xff..ff00..00`, `s = 0x7aaa..aa`, `v = 28`. Recovers to some
/// address without reverting, so validation runs its full path.
pub const DUMMY_ECDSA_SIGNATURE: [u8; 65] = hex!(
    "ffffffffffffffffffffffffffffffff00000000000000000000000000000000"
    "7aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
    "1c"
);

/// Signer variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    Ecdsa,
    Passkey,
    Session,
}

impl std::fmt::Display for SignerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerKind::Ecdsa => write!(f, "ecdsa"),
            SignerKind::Passkey => write!(f, "passkey"),
            SignerKind::Session => write!(f, "session"),
        }
    }
}

/// Account a signature is produced for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub config: SafeAccountConfig,
    /// Safe the signature authorizes
    pub account: Address,
    /// Validity window bound into user-operation signatures
    pub window: ValidityWindow,
}

impl SigningContext {
    pub fn new(config: SafeAccountConfig, account: Address) -> Self {
        Self {
            config,
            account,
            window: ValidityWindow::unbounded(),
        }
    }

    pub fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    /// Reject operations whose sender is not this context's account
    pub fn ensure_sender(&self, op: &UserOperation) -> Result<()> {
        if op.sender != self.account {
            return Err(Error::CannotSignForAddress {
                requested: op.sender,
                signer: self.account,
            });
        }
        Ok(())
    }
}

/// Contract shared by every signer variant
#[async_trait]
pub trait Signer: Send + Sync {
    fn kind(&self) -> SignerKind;

    /// Address recorded as the Safe owner for this signer
    fn owner(&self, config: &SafeAccountConfig) -> Address;

    /// Nonce key the signer's operations use
    fn nonce_key(&self, _ctx: &SigningContext) -> U256 {
        U256::ZERO
    }

    /// Whether `requested` may be signed for: the account itself or the owner
    fn ensure_can_sign(&self, ctx: &SigningContext, requested: Address) -> Result<()> {
        if requested == ctx.account || requested == self.owner(&ctx.config) {
            Ok(())
        } else {
            Err(Error::CannotSignForAddress {
                requested,
                signer: ctx.account,
            })
        }
    }

    /// ERC-1271 signature over an EIP-191 message
    async fn sign_message(&self, ctx: &SigningContext, message: &[u8]) -> Result<Bytes>;

    /// ERC-1271 signature over EIP-712 typed data
    async fn sign_typed_data(&self, ctx: &SigningContext, typed_data: &TypedData) -> Result<Bytes>;

    /// Sign `op`, which is left untouched on failure
    async fn sign_user_operation(
        &self,
        ctx: &SigningContext,
        op: UserOperation,
    ) -> Result<SignedUserOperation>;

    /// Placeholder of the same length as the real user-operation signature
    async fn stub_signature(&self, ctx: &SigningContext) -> Result<Bytes>;
}

/// EIP-712 signing hash of caller-supplied typed data
pub(crate) fn typed_data_hash(typed_data: &TypedData) -> Result<B256> {
    typed_data
        .eip712_signing_hash()
        .map_err(|e| Error::abi("typedData", e))
}

// ============================================================================
// Closed union
// ============================================================================

/// Any of the supported signers
#[derive(Debug, Clone)]
pub enum AccountSigner {
    Ecdsa(EcdsaSigner),
    Passkey(PasskeySigner),
    Session(SmartSessionSigner),
}

impl From<EcdsaSigner> for AccountSigner {
    fn from(signer: EcdsaSigner) -> Self {
        AccountSigner::Ecdsa(signer)
    }
}

impl From<PasskeySigner> for AccountSigner {
    fn from(signer: PasskeySigner) -> Self {
        AccountSigner::Passkey(signer)
    }
}

impl From<SmartSessionSigner> for AccountSigner {
    fn from(signer: SmartSessionSigner) -> Self {
        AccountSigner::Session(signer)
    }
}

#[async_trait]
impl Signer for AccountSigner {
    fn kind(&self) -> SignerKind {
        match self {
            AccountSigner::Ecdsa(s) => s.kind(),
            AccountSigner::Passkey(s) => s.kind(),
            AccountSigner::Session(s) => s.kind(),
        }
    }

    fn owner(&self, config: &SafeAccountConfig) -> Address {
        match self {
            AccountSigner::Ecdsa(s) => s.owner(config),
            AccountSigner::Passkey(s) => s.owner(config),
            AccountSigner::Session(s) => s.owner(config),
        }
    }

    fn nonce_key(&self, ctx: &SigningContext) -> U256 {
        match self {
            AccountSigner::Ecdsa(s) => s.nonce_key(ctx),
            AccountSigner::Passkey(s) => s.nonce_key(ctx),
            AccountSigner::Session(s) => s.nonce_key(ctx),
        }
    }

    async fn sign_message(&self, ctx: &SigningContext, message: &[u8]) -> Result<Bytes> {
        match self {
            AccountSigner::Ecdsa(s) => s.sign_message(ctx, message).await,
            AccountSigner::Passkey(s) => s.sign_message(ctx, message).await,
            AccountSigner::Session(s) => s.sign_message(ctx, message).await,
        }
    }

    async fn sign_typed_data(&self, ctx: &SigningContext, typed_data: &TypedData) -> Result<Bytes> {
        match self {
            AccountSigner::Ecdsa(s) => s.sign_typed_data(ctx, typed_data).await,
            AccountSigner::Passkey(s) => s.sign_typed_data(ctx, typed_data).await,
            AccountSigner::Session(s) => s.sign_typed_data(ctx, typed_data).await,
        }
    }

    async fn sign_user_operation(
        &self,
        ctx: &SigningContext,
        op: UserOperation,
    ) -> Result<SignedUserOperation> {
        match self {
            AccountSigner::Ecdsa(s) => s.sign_user_operation(ctx, op).await,
            AccountSigner::Passkey(s) => s.sign_user_operation(ctx, op).await,
            AccountSigner::Session(s) => s.sign_user_operation(ctx, op).await,
        }
    }

    async fn stub_signature(&self, ctx: &SigningContext) -> Result<Bytes> {
        match self {
            AccountSigner::Ecdsa(s) => s.stub_signature(ctx).await,
            AccountSigner::Passkey(s) => s.stub_signature(ctx).await,
            AccountSigner::Session(s) => s.stub_signature(ctx).await,
        }
    }
}
