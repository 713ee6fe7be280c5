//! secp256k1 key owning the Safe directly

use super::{DUMMY_ECDSA_SIGNATURE, Signer, SignerKind, SigningContext, typed_data_hash};
use crate::config::SafeAccountConfig;
use crate::signature::{
    SafeSignature, build_signature_bytes, encode_user_op_signature, safe_message_hash,
    safe_op_hash,
};
use crate::types::{Signature, decode_hex, keccak256};
use crate::user_op::{SignedUserOperation, UserOperation};
use crate::{Error, Result};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Bytes, eip191_hash_message};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use tracing::{debug, instrument};
use zeroize::Zeroize;

/// Local secp256k1 signer
#[derive(Clone)]
pub struct EcdsaSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl EcdsaSigner {
    pub fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// From a 32-byte secret scalar
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self> {
        SigningKey::from_bytes(secret.into())
            .map(Self::from_key)
            .map_err(|e| Error::Crypto(format!("invalid secp256k1 key: {e}")))
    }

    /// From a hex secret, with or without `0x`
    pub fn from_hex(secret: &str) -> Result<Self> {
        let mut bytes = decode_hex("privateKey", secret)?;
        if bytes.len() != 32 {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(Error::InvalidLength {
                field: "privateKey",
                expected: 32,
                actual,
            });
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        bytes.zeroize();
        let signer = Self::from_bytes(&secret);
        secret.zeroize();
        signer
    }

    /// Fresh random key
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Secret scalar, for encrypted persistence
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes().into()
    }

    /// Sign a 32-byte digest with no further hashing
    pub fn sign_hash(&self, hash: B256) -> Result<Signature> {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature::new(r, s, recovery_id.to_byte()))
    }

    /// Safe signature from this owner over `hash`
    fn safe_signature(&self, hash: B256) -> Result<Bytes> {
        let signature = self.sign_hash(hash)?;
        Ok(build_signature_bytes(&[SafeSignature::Ecdsa {
            signer: self.address,
            signature,
        }]))
    }
}

/// Ethereum address of a secp256k1 public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the signing address of `signature` over `hash`
pub fn recover_address(hash: B256, signature: &Signature) -> Result<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);
    let sig = k256::ecdsa::Signature::from_slice(&rs).map_err(|e| Error::Crypto(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id)
        .ok_or_else(|| Error::Crypto(format!("invalid recovery id {}", signature.recovery_id)))?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recovery_id)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(address_of(&key))
}

#[async_trait]
impl Signer for EcdsaSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Ecdsa
    }

    fn owner(&self, _config: &SafeAccountConfig) -> Address {
        self.address
    }

    #[instrument(skip(self, ctx, message), fields(signer = %self.address, account = %ctx.account))]
    async fn sign_message(&self, ctx: &SigningContext, message: &[u8]) -> Result<Bytes> {
        let hash = safe_message_hash(
            ctx.account,
            ctx.config.chain_id()?,
            eip191_hash_message(message),
        );
        self.safe_signature(hash)
    }

    #[instrument(skip(self, ctx, typed_data), fields(signer = %self.address, account = %ctx.account))]
    async fn sign_typed_data(&self, ctx: &SigningContext, typed_data: &TypedData) -> Result<Bytes> {
        let hash = safe_message_hash(
            ctx.account,
            ctx.config.chain_id()?,
            typed_data_hash(typed_data)?,
        );
        self.safe_signature(hash)
    }

    #[instrument(skip(self, ctx, op), fields(signer = %self.address, sender = %op.sender))]
    async fn sign_user_operation(
        &self,
        ctx: &SigningContext,
        op: UserOperation,
    ) -> Result<SignedUserOperation> {
        ctx.ensure_sender(&op)?;
        let hash = safe_op_hash(&ctx.config, &op, ctx.window)?;
        let owners = self.safe_signature(hash)?;
        let signature = encode_user_op_signature(ctx.window, &owners)?;
        debug!(%hash, "signed SafeOp");
        Ok(op.into_signed(signature))
    }

    async fn stub_signature(&self, ctx: &SigningContext) -> Result<Bytes> {
        encode_user_op_signature(ctx.window, &DUMMY_ECDSA_SIGNATURE)
    }
}
