//! # Safe Accounts
//!
//! Address prediction, setup payloads and lifecycle of a Safe smart account.
//!
//! An account starts `Undeployed`: its address is predicted from the proxy
//! factory, the singleton and the setup payload. The first user operation
//! carries factory data deploying the proxy; once code is present at the
//! address the account is `Deployed` and never goes back.

pub mod address;
pub mod initializer;
pub mod multisend;

pub use address::{AddressPrediction, create2_address, predict_address, predict_address_hex};
pub use initializer::{Initializer, InitializerParams};
pub use multisend::{MetaTransaction, Operation};

use crate::chain::{self, ChainStateReader};
use crate::config::SafeAccountConfig;
use crate::contracts::ISafeProxyFactory;
use crate::execution::encode_account_calls;
use crate::types::Call;
use crate::user_op::{FactoryFields, UserOperation};
use crate::{Error, Result};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Deployment status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountState {
    /// Only the predicted address exists
    Undeployed,
    /// Proxy bytecode is on chain
    Deployed,
}

/// Deployment status read from chain, `None` when no code is at `address`
pub async fn try_get_on_chain_state(
    reader: &dyn ChainStateReader,
    address: Address,
) -> Result<Option<AccountState>> {
    let code = reader.get_code(address).await?;
    Ok((!code.is_empty()).then_some(AccountState::Deployed))
}

/// A Safe account bound to one configuration and setup payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartAccount {
    config: SafeAccountConfig,
    initializer: Initializer,
    salt_nonce: U256,
    address: Address,
    state: AccountState,
}

impl SmartAccount {
    /// Account at its predicted address, assumed undeployed
    pub fn counterfactual(
        config: SafeAccountConfig,
        params: &InitializerParams,
        salt_nonce: U256,
    ) -> Result<Self> {
        let initializer = Initializer::build(&config, params)?;
        let address = predict_address(
            config.proxy_factory,
            &config.proxy_creation_code,
            config.safe_singleton,
            &initializer.encode(),
            salt_nonce,
        );
        debug!(%address, %salt_nonce, "predicted Safe address");
        Ok(Self {
            config,
            initializer,
            salt_nonce,
            address,
            state: AccountState::Undeployed,
        })
    }

    /// Refresh the deployment state from chain, falling back to the
    /// prediction when no code is present. A deployed account stays deployed.
    #[instrument(skip(self, reader), fields(address = %self.address))]
    pub async fn resolve(&mut self, reader: &dyn ChainStateReader) -> Result<AccountState> {
        if self.is_deployed() {
            return Ok(AccountState::Deployed);
        }
        let state = match try_get_on_chain_state(reader, self.address).await? {
            Some(state) => state,
            None => AccountState::Undeployed,
        };
        if state != self.state {
            info!(?state, "account state changed");
        }
        self.state = state;
        Ok(state)
    }

    /// Record that the deploying operation was included
    pub fn mark_deployed(&mut self) {
        self.state = AccountState::Deployed;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn is_deployed(&self) -> bool {
        self.state == AccountState::Deployed
    }

    pub fn config(&self) -> &SafeAccountConfig {
        &self.config
    }

    pub fn initializer(&self) -> &Initializer {
        &self.initializer
    }

    pub fn salt_nonce(&self) -> U256 {
        self.salt_nonce
    }

    /// `createProxyWithNonce` on the proxy factory, `None` once deployed
    pub fn factory_fields(&self) -> Option<FactoryFields> {
        if self.is_deployed() {
            return None;
        }
        let data = ISafeProxyFactory::createProxyWithNonceCall {
            _singleton: self.config.safe_singleton,
            initializer: self.initializer.encode(),
            saltNonce: self.salt_nonce,
        }
        .abi_encode();
        Some(FactoryFields {
            factory: self.config.proxy_factory,
            factory_data: data.into(),
        })
    }

    /// Account calldata executing `calls`
    pub fn encode_calls(&self, calls: &[Call]) -> Result<alloy_primitives::Bytes> {
        encode_account_calls(&self.config, calls)
    }

    /// Unsigned operation executing `calls`, deploying first if needed
    pub fn build_user_operation(&self, calls: &[Call], nonce: U256) -> Result<UserOperation> {
        let mut op = UserOperation::new(self.address, nonce, self.encode_calls(calls)?);
        op.factory = self.factory_fields();
        Ok(op)
    }

    /// Entry point nonce under `key`
    pub async fn get_nonce(&self, reader: &dyn ChainStateReader, key: U256) -> Result<U256> {
        if !self.is_deployed() {
            return Ok(crate::session::nonce_with_key(key, 0));
        }
        chain::get_nonce(reader, self.config.entry_point, self.address, key).await
    }

    /// Whether `module` is enabled on the deployed Safe
    pub async fn is_module_enabled(
        &self,
        reader: &dyn ChainStateReader,
        module: Address,
    ) -> Result<bool> {
        if !self.is_deployed() {
            return Err(Error::AccountNotDeployed(self.address));
        }
        chain::is_module_enabled(reader, self.address, module).await
    }

    /// Fail with [`Error::ModuleNotInstalled`] unless `module` is enabled
    pub async fn ensure_module_enabled(
        &self,
        reader: &dyn ChainStateReader,
        module: Address,
    ) -> Result<()> {
        if self.is_module_enabled(reader, module).await? {
            Ok(())
        } else {
            Err(Error::ModuleNotInstalled(module))
        }
    }
}
