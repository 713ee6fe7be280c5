//! Session key signing through the smart-sessions validator

use super::{DUMMY_ECDSA_SIGNATURE, EcdsaSigner, Signer, SignerKind, SigningContext};
use crate::chain::{ChainStateReader, is_permission_enabled};
use crate::config::SafeAccountConfig;
use crate::session::{
    AccountType, SessionMode, derive_nonce_key, encode_use_signature, nonce_with_key,
};
use crate::user_op::{SignedUserOperation, UserOperation};
use crate::{Error, Result};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Bytes, U256, eip191_hash_message};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Signs user operations with a session key under an enabled permission
#[derive(Clone)]
pub struct SmartSessionSigner {
    session_key: EcdsaSigner,
    permission_id: B256,
    mode: SessionMode,
    account_type: AccountType,
    reader: Arc<dyn ChainStateReader>,
}

impl std::fmt::Debug for SmartSessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartSessionSigner")
            .field("session_key", &self.session_key.address())
            .field("permission_id", &self.permission_id)
            .field("mode", &self.mode)
            .field("account_type", &self.account_type)
            .finish_non_exhaustive()
    }
}

impl SmartSessionSigner {
    pub fn new(
        session_key: EcdsaSigner,
        permission_id: B256,
        reader: Arc<dyn ChainStateReader>,
    ) -> Self {
        Self {
            session_key,
            permission_id,
            mode: SessionMode::Use,
            account_type: AccountType::Safe,
            reader,
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }

    pub fn permission_id(&self) -> B256 {
        self.permission_id
    }

    pub fn session_key(&self) -> Address {
        self.session_key.address()
    }

    fn ensure_use_mode(&self) -> Result<()> {
        match self.mode {
            SessionMode::Use => Ok(()),
            SessionMode::Enable | SessionMode::UnsafeEnable => {
                Err(Error::NotSupported("enabling a session while signing"))
            }
        }
    }

    fn ensure_7579(config: &SafeAccountConfig) -> Result<()> {
        if config.erc7579 {
            Ok(())
        } else {
            Err(Error::InvalidConfig(
                "smart sessions require an ERC-7579 account".into(),
            ))
        }
    }
}

#[async_trait]
impl Signer for SmartSessionSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Session
    }

    fn owner(&self, _config: &SafeAccountConfig) -> Address {
        self.session_key.address()
    }

    fn nonce_key(&self, ctx: &SigningContext) -> U256 {
        derive_nonce_key(self.account_type, ctx.config.smart_sessions)
    }

    async fn sign_message(&self, _ctx: &SigningContext, _message: &[u8]) -> Result<Bytes> {
        Err(Error::NotSupported("message signing with a session key"))
    }

    async fn sign_typed_data(&self, _ctx: &SigningContext, _typed_data: &TypedData) -> Result<Bytes> {
        Err(Error::NotSupported("typed data signing with a session key"))
    }

    #[instrument(
        skip(self, ctx, op),
        fields(sender = %op.sender, permission_id = %self.permission_id)
    )]
    async fn sign_user_operation(
        &self,
        ctx: &SigningContext,
        mut op: UserOperation,
    ) -> Result<SignedUserOperation> {
        self.ensure_use_mode()?;
        Self::ensure_7579(&ctx.config)?;
        ctx.ensure_sender(&op)?;

        let enabled = is_permission_enabled(
            self.reader.as_ref(),
            ctx.config.smart_sessions,
            self.permission_id,
            ctx.account,
        )
        .await?;
        if !enabled {
            warn!("session permission not enabled on account");
            return Err(Error::PermissionNotInstalled(self.permission_id));
        }

        op.nonce = nonce_with_key(self.nonce_key(ctx), op.nonce_sequence());
        let hash = op.hash(
            ctx.config.entry_point_version,
            ctx.config.entry_point,
            ctx.config.chain_id()?,
        )?;
        let signature = self.session_key.sign_hash(eip191_hash_message(hash))?;
        debug!(%hash, nonce = %op.nonce, "signed user operation with session key");
        let envelope = encode_use_signature(self.permission_id, &signature.to_rsv_bytes());
        Ok(op.into_signed(envelope))
    }

    async fn stub_signature(&self, _ctx: &SigningContext) -> Result<Bytes> {
        Ok(encode_use_signature(self.permission_id, &DUMMY_ECDSA_SIGNATURE))
    }
}
