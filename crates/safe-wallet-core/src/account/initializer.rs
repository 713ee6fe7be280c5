//! Safe `setup` payload construction
//!
//! The setup call delegate-calls one helper. With a single sub-transaction
//! (enable the validation module) the helper is the module-setup library.
//! When more work is needed at deployment (configuring the WebAuthn shared
//! signer, initialising the Safe7579 adapter, caller-supplied extras) the
//! sub-transactions are routed atomically through MultiSend.

use super::multisend::{MetaTransaction, encode_multi_send};
use crate::config::SafeAccountConfig;
use crate::contracts::{
    ISafe, ISafe7579, ISafeModuleSetup, ISafeWebAuthnSharedSigner, ModuleInit, RegistryInit,
    SharedSignerConfig,
};
use crate::types::keccak256;
use crate::webauthn::P256PublicKey;
use crate::{Error, Result};
use alloy_primitives::aliases::U176;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolCall;
use tracing::debug;

/// Caller-supplied account definition
#[derive(Debug, Clone, Default)]
pub struct InitializerParams {
    /// ECDSA owner addresses
    pub owners: Vec<Address>,
    /// Passkey owner, installed behind the WebAuthn shared signer
    pub passkey: Option<P256PublicKey>,
    /// Signature threshold, defaults to 1 when zero
    pub threshold: u64,
    /// Safe7579 validators to install
    pub validators: Vec<ModuleInit>,
    /// Safe7579 executors to install
    pub executors: Vec<ModuleInit>,
    /// Safe7579 fallbacks to install
    pub fallbacks: Vec<ModuleInit>,
    /// Safe7579 hooks to install
    pub hooks: Vec<ModuleInit>,
    /// Additional setup transactions, executed after module setup
    pub extra_transactions: Vec<MetaTransaction>,
}

impl InitializerParams {
    /// Single ECDSA owner
    pub fn single_owner(owner: Address) -> Self {
        Self {
            owners: vec![owner],
            threshold: 1,
            ..Default::default()
        }
    }

    /// Single passkey owner
    pub fn passkey_owner(passkey: P256PublicKey) -> Self {
        Self {
            passkey: Some(passkey),
            threshold: 1,
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_validator(mut self, module: Address, init_data: impl Into<Bytes>) -> Self {
        self.validators.push(ModuleInit {
            module,
            initData: init_data.into(),
        });
        self
    }

    pub fn with_executor(mut self, module: Address, init_data: impl Into<Bytes>) -> Self {
        self.executors.push(ModuleInit {
            module,
            initData: init_data.into(),
        });
        self
    }

    pub fn with_extra_transaction(mut self, tx: MetaTransaction) -> Self {
        self.extra_transactions.push(tx);
        self
    }
}

/// Fully resolved setup payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
    pub singleton: Address,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub fallback_handler: Address,
    /// Sub-transactions executed by the setup delegate call
    pub transactions: Vec<MetaTransaction>,
    /// Target of the setup delegate call
    pub setup_to: Address,
    /// Data of the setup delegate call
    pub setup_data: Bytes,
}

impl Initializer {
    /// Resolve `params` against the protocol addresses in `config`
    pub fn build(config: &SafeAccountConfig, params: &InitializerParams) -> Result<Self> {
        config.validate()?;

        let mut owners = params.owners.clone();
        if params.passkey.is_some() {
            owners.push(config.webauthn_shared_signer);
        }
        if owners.is_empty() {
            return Err(Error::MissingOwner);
        }
        let threshold = if params.threshold == 0 { 1 } else { params.threshold };
        if threshold as usize > owners.len() {
            return Err(Error::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }

        let module = config.validation_module();
        let enable_modules = ISafeModuleSetup::enableModulesCall {
            modules: vec![module],
        }
        .abi_encode();

        let mut transactions = vec![MetaTransaction::delegate_call(
            config.safe_module_setup,
            enable_modules.clone(),
        )];

        if let Some(passkey) = &params.passkey {
            let configure = ISafeWebAuthnSharedSigner::configureCall {
                signer: SharedSignerConfig {
                    x: passkey.x,
                    y: passkey.y,
                    verifiers: shared_signer_verifiers(config.p256_precompile, config.p256_verifier),
                },
            }
            .abi_encode();
            transactions.push(MetaTransaction::delegate_call(
                config.webauthn_shared_signer,
                configure,
            ));
        }

        if config.erc7579 {
            let mut attesters = config.attesters.clone();
            attesters.sort();
            attesters.dedup();
            let init = ISafe7579::initializeAccountCall {
                validators: params.validators.clone(),
                executors: params.executors.clone(),
                fallbacks: params.fallbacks.clone(),
                hooks: params.hooks.clone(),
                registryInit: RegistryInit {
                    registry: config.registry,
                    attesters,
                    threshold: config.attesters_threshold,
                },
            }
            .abi_encode();
            transactions.push(MetaTransaction::call(config.safe_7579, U256::ZERO, init));
        }

        transactions.extend(params.extra_transactions.iter().cloned());

        let (setup_to, setup_data) = if transactions.len() == 1 {
            (config.safe_module_setup, Bytes::from(enable_modules))
        } else {
            (config.multi_send, encode_multi_send(&transactions))
        };

        debug!(
            owners = owners.len(),
            threshold,
            sub_transactions = transactions.len(),
            "built Safe initializer"
        );

        Ok(Self {
            singleton: config.safe_singleton,
            owners,
            threshold,
            fallback_handler: module,
            transactions,
            setup_to,
            setup_data,
        })
    }

    /// Whether setup is routed through MultiSend
    pub fn uses_multi_send(&self) -> bool {
        self.transactions.len() > 1
    }

    /// `setup(...)` calldata, the `initializer` argument of the proxy factory
    pub fn encode(&self) -> Bytes {
        ISafe::setupCall {
            _owners: self.owners.clone(),
            _threshold: U256::from(self.threshold),
            to: self.setup_to,
            data: self.setup_data.clone(),
            fallbackHandler: self.fallback_handler,
            paymentToken: Address::ZERO,
            payment: U256::ZERO,
            paymentReceiver: Address::ZERO,
        }
        .abi_encode()
        .into()
    }

    /// keccak256 of the encoded setup call
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }
}

/// Pack the shared signer's verifier word: `precompile(16) || verifier(160)`
pub fn shared_signer_verifiers(precompile: u16, verifier: Address) -> U176 {
    (U176::from(precompile) << 160) | U176::from_be_slice(verifier.as_slice())
}
