//! Credential Cache Interface
//!
//! Passkey credentials and session keys outlive a single signing call, so
//! callers persist them. This module defines what is stored and under which
//! key; the storage mechanism is injected through [`CredentialStore`].
//!
//! - **Passkeys**: credential id and public key, stored in the clear
//! - **Session keys**: secp256k1 secrets, encrypted with ChaCha20-Poly1305
//!
//! ## Example
//!
//! ```rust,ignore
//! let store = MemoryCredentialStore::new();
//! let key = generate_encryption_key();
//!
//! let entry = EncryptedSessionKey::encrypt(&session_signer, binding, &key)?;
//! store.put(&entry.cache_key(), CredentialEntry::SessionKey(entry)).await?;
//! ```

use crate::signer::EcdsaSigner;
use crate::types::ChainId;
use crate::webauthn::AttestedCredential;
use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

// ============================================================================
// Cache keys
// ============================================================================

/// `passkey:{rpId}:{credentialId}`
pub fn passkey_cache_key(rp_id: &str, credential_id_b64: &str) -> String {
    format!("passkey:{rp_id}:{credential_id_b64}")
}

/// `session:{chainId}:{account}:{permissionId}`
pub fn session_cache_key(chain_id: ChainId, account: Address, permission_id: B256) -> String {
    format!("session:{}:{account:#x}:{permission_id}", chain_id.0)
}

/// `account:{chainId}:{owner}`
pub fn account_cache_key(chain_id: ChainId, owner: Address) -> String {
    format!("account:{}:{owner:#x}", chain_id.0)
}

// ============================================================================
// Values
// ============================================================================

/// Registered passkey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPasskey {
    pub credential: AttestedCredential,
    pub rp_id: String,
    pub origin: String,
    pub user_name: String,
    pub created_at: i64,
}

impl StoredPasskey {
    pub fn new(
        credential: AttestedCredential,
        rp_id: impl Into<String>,
        origin: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            rp_id: rp_id.into(),
            origin: origin.into(),
            user_name: user_name.into(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn cache_key(&self) -> String {
        passkey_cache_key(&self.rp_id, &self.credential.credential_id_b64())
    }
}

/// Where a session key is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBinding {
    pub chain_id: ChainId,
    pub account: Address,
    pub permission_id: B256,
}

/// Session private key encrypted at rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSessionKey {
    /// Encrypted 32-byte secret
    pub ciphertext: Vec<u8>,
    /// Nonce used for encryption (12 bytes)
    pub nonce: [u8; 12],
    /// Session key address (not encrypted)
    pub address: Address,
    pub binding: SessionBinding,
    pub created_at: i64,
    /// Version for future compatibility
    pub version: u32,
}

impl EncryptedSessionKey {
    /// Current version of the encrypted key format
    pub const CURRENT_VERSION: u32 = 1;

    /// Encrypt a session key using the provided key
    pub fn encrypt(
        signer: &EcdsaSigner,
        binding: SessionBinding,
        encryption_key: &[u8; 32],
    ) -> Result<Self> {
        let cipher = ChaCha20Poly1305::new(encryption_key.into());

        let nonce_bytes: [u8; 12] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = Zeroizing::new(signer.to_bytes());
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(Self {
            ciphertext,
            nonce: nonce_bytes,
            address: signer.address(),
            binding,
            created_at: chrono::Utc::now().timestamp(),
            version: Self::CURRENT_VERSION,
        })
    }

    /// Decrypt the session key using the provided key
    pub fn decrypt(&self, encryption_key: &[u8; 32]) -> Result<EcdsaSigner> {
        let cipher = ChaCha20Poly1305::new(encryption_key.into());
        let nonce = Nonce::from_slice(&self.nonce);

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(nonce, self.ciphertext.as_ref())
                .map_err(|_| {
                    Error::Encryption("Decryption failed - invalid key or corrupted data".into())
                })?,
        );
        if plaintext.len() != 32 {
            return Err(Error::InvalidLength {
                field: "session key",
                expected: 32,
                actual: plaintext.len(),
            });
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&plaintext);
        let signer = EcdsaSigner::from_bytes(&secret)?;

        if signer.address() != self.address {
            return Err(Error::Encryption(
                "decrypted key does not match stored address".into(),
            ));
        }
        Ok(signer)
    }

    pub fn cache_key(&self) -> String {
        session_cache_key(
            self.binding.chain_id,
            self.binding.account,
            self.binding.permission_id,
        )
    }
}

/// Anything the cache holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialEntry {
    Passkey(StoredPasskey),
    SessionKey(EncryptedSessionKey),
    /// Predicted or deployed account address for an owner
    Account { address: Address },
}

// ============================================================================
// Store
// ============================================================================

/// Trait for credential storage backends
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace an entry
    async fn put(&self, key: &str, entry: CredentialEntry) -> Result<()>;

    /// Load an entry, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<CredentialEntry>>;

    /// Remove an entry
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, CredentialEntry>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, key: &str, entry: CredentialEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CredentialEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Passkey stored under `key`
pub async fn load_passkey(store: &dyn CredentialStore, key: &str) -> Result<Option<StoredPasskey>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(CredentialEntry::Passkey(passkey)) => Ok(Some(passkey)),
        Some(other) => Err(wrong_kind(key, "passkey", &other)),
    }
}

/// Encrypted session key stored under `key`
pub async fn load_session_key(
    store: &dyn CredentialStore,
    key: &str,
) -> Result<Option<EncryptedSessionKey>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(CredentialEntry::SessionKey(entry)) => Ok(Some(entry)),
        Some(other) => Err(wrong_kind(key, "session key", &other)),
    }
}

/// Account address cached for `owner` on `chain_id`
pub async fn load_account(
    store: &dyn CredentialStore,
    chain_id: ChainId,
    owner: Address,
) -> Result<Option<Address>> {
    let key = account_cache_key(chain_id, owner);
    match store.get(&key).await? {
        None => Ok(None),
        Some(CredentialEntry::Account { address }) => Ok(Some(address)),
        Some(other) => Err(wrong_kind(&key, "account", &other)),
    }
}

fn wrong_kind(key: &str, expected: &str, found: &CredentialEntry) -> Error {
    let found = match found {
        CredentialEntry::Passkey(_) => "passkey",
        CredentialEntry::SessionKey(_) => "session key",
        CredentialEntry::Account { .. } => "account",
    };
    Error::Storage(format!("entry {key} is a {found}, expected a {expected}"))
}

/// Generate a random encryption key
pub fn generate_encryption_key() -> [u8; 32] {
    rand::random()
}
