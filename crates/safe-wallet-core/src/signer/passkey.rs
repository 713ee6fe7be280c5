//! WebAuthn passkey owning the Safe through the shared signer

use super::{Signer, SignerKind, SigningContext, typed_data_hash};
use crate::config::SafeAccountConfig;
use crate::signature::{
    SafeSignature, build_signature_bytes, encode_user_op_signature, safe_message_hash,
    safe_op_hash,
};
use crate::user_op::{SignedUserOperation, UserOperation};
use crate::webauthn::{
    AttestedCredential, DecodedAssertion, WebAuthnAssertion, decode_assertion,
    parse_attestation_object, stub_assertion, verify_assertion,
};
use crate::{Error, Result};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Bytes, eip191_hash_message};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Device-side authenticator performing WebAuthn ceremonies
///
/// `Ok(None)` means the user dismissed the prompt.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Create a credential and return its CBOR attestation object
    async fn create_credential(&self, rp_id: &str, user_name: &str) -> Result<Option<Bytes>>;

    /// Request an assertion over `challenge` from `credential_id`
    async fn get_assertion(
        &self,
        credential_id: &[u8],
        challenge: B256,
    ) -> Result<Option<WebAuthnAssertion>>;
}

/// Passkey signer
#[derive(Clone)]
pub struct PasskeySigner {
    credential: AttestedCredential,
    authenticator: Arc<dyn PlatformAuthenticator>,
    origin: String,
}

impl std::fmt::Debug for PasskeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeySigner")
            .field("credential_id", &self.credential.credential_id_b64())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl PasskeySigner {
    /// Wrap an existing credential
    ///
    /// # Arguments
    /// * `credential` - Credential id and public key from registration
    /// * `authenticator` - Device authenticator holding the private key
    /// * `origin` - Origin the authenticator reports in client data
    pub fn new(
        credential: AttestedCredential,
        authenticator: Arc<dyn PlatformAuthenticator>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            authenticator,
            origin: origin.into(),
        }
    }

    /// Run a registration ceremony and wrap the resulting credential
    #[instrument(skip(authenticator, config))]
    pub async fn register(
        authenticator: Arc<dyn PlatformAuthenticator>,
        config: &SafeAccountConfig,
        rp_id: &str,
        user_name: &str,
        origin: &str,
    ) -> Result<Self> {
        let ceremony = authenticator.create_credential(rp_id, user_name);
        let attestation = with_timeout(config.passkey_timeout(), ceremony).await?;
        let credential = parse_attestation_object(&attestation)?;
        info!(credential_id = %credential.credential_id_b64(), "registered passkey");
        Ok(Self::new(credential, authenticator, origin))
    }

    pub fn credential(&self) -> &AttestedCredential {
        &self.credential
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Obtain and check an assertion over `hash`
    async fn assert(&self, timeout: Duration, hash: B256) -> Result<DecodedAssertion> {
        let ceremony = self
            .authenticator
            .get_assertion(&self.credential.credential_id, hash);
        let assertion = with_timeout(timeout, ceremony).await?;
        let decoded = decode_assertion(&assertion)?;
        verify_assertion(&decoded, hash, &self.credential.public_key)
            .map_err(|e| Error::PasskeySignatureFailed(format!("assertion does not verify: {e}")))?;
        Ok(decoded)
    }

    /// Safe contract signature from the shared signer over `hash`
    async fn safe_signature(&self, config: &SafeAccountConfig, hash: B256) -> Result<Bytes> {
        let assertion = self.assert(config.passkey_timeout(), hash).await?;
        Ok(contract_signature(config, &assertion))
    }
}

fn contract_signature(config: &SafeAccountConfig, assertion: &DecodedAssertion) -> Bytes {
    build_signature_bytes(&[SafeSignature::Contract {
        signer: config.webauthn_shared_signer,
        data: assertion.encode(),
    }])
}

/// Bound an authenticator ceremony; timeout, cancellation and failure all
/// surface as [`Error::PasskeySignatureFailed`]
async fn with_timeout<T, F>(timeout: Duration, ceremony: F) -> Result<T>
where
    F: std::future::Future<Output = Result<Option<T>>>,
{
    match tokio::time::timeout(timeout, ceremony).await {
        Ok(Ok(Some(value))) => Ok(value),
        Ok(Ok(None)) => {
            warn!("authenticator ceremony cancelled");
            Err(Error::PasskeySignatureFailed("cancelled by user".into()))
        }
        Ok(Err(e)) => Err(Error::PasskeySignatureFailed(e.to_string())),
        Err(_) => {
            warn!(?timeout, "authenticator ceremony timed out");
            Err(Error::PasskeySignatureFailed(format!(
                "no response within {}s",
                timeout.as_secs()
            )))
        }
    }
}

#[async_trait]
impl Signer for PasskeySigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Passkey
    }

    fn owner(&self, config: &SafeAccountConfig) -> Address {
        config.webauthn_shared_signer
    }

    #[instrument(skip(self, ctx, message), fields(account = %ctx.account))]
    async fn sign_message(&self, ctx: &SigningContext, message: &[u8]) -> Result<Bytes> {
        let hash = safe_message_hash(
            ctx.account,
            ctx.config.chain_id()?,
            eip191_hash_message(message),
        );
        self.safe_signature(&ctx.config, hash).await
    }

    #[instrument(skip(self, ctx, typed_data), fields(account = %ctx.account))]
    async fn sign_typed_data(&self, ctx: &SigningContext, typed_data: &TypedData) -> Result<Bytes> {
        let hash = safe_message_hash(
            ctx.account,
            ctx.config.chain_id()?,
            typed_data_hash(typed_data)?,
        );
        self.safe_signature(&ctx.config, hash).await
    }

    #[instrument(skip(self, ctx, op), fields(sender = %op.sender))]
    async fn sign_user_operation(
        &self,
        ctx: &SigningContext,
        op: UserOperation,
    ) -> Result<SignedUserOperation> {
        ctx.ensure_sender(&op)?;
        let hash = safe_op_hash(&ctx.config, &op, ctx.window)?;
        let owners = self.safe_signature(&ctx.config, hash).await?;
        let signature = encode_user_op_signature(ctx.window, &owners)?;
        debug!(%hash, len = signature.len(), "signed SafeOp with passkey");
        Ok(op.into_signed(signature))
    }

    async fn stub_signature(&self, ctx: &SigningContext) -> Result<Bytes> {
        let owners = contract_signature(&ctx.config, &stub_assertion(&self.origin));
        encode_user_op_signature(ctx.window, &owners)
    }
}
