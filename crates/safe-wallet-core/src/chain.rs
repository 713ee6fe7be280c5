//! External collaborator boundaries
//!
//! The crate never talks to a network itself. Callers inject:
//!
//! - [`ChainStateReader`]: `eth_getCode` / `eth_call` against a node
//! - [`BundlerClient`]: the ERC-4337 bundler JSON-RPC methods
//! - [`PaymasterClient`]: gas sponsorship
//!
//! Retry and backoff belong to the implementations of these traits.

use crate::config::EntryPointVersion;
use crate::contracts::{IERC7579Account, IEntryPoint, ISafe, ISmartSessions};
use crate::types::{ChainId, parse_address, parse_b256};
use crate::user_op::{PaymasterFields, SignedUserOperation, UserOperation};
use crate::{Error, Result};
use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

// ============================================================================
// Chain state
// ============================================================================

/// Read-only view of chain state
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Deployed bytecode at `address`, empty when none
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// `eth_call` at the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// `eth_call` `call` on `to` and decode its return values.
///
/// Empty return data means no contract answered at `to`.
async fn call_contract<C: SolCall + Send>(
    reader: &dyn ChainStateReader,
    to: Address,
    call: C,
    method: &'static str,
) -> Result<C::Return> {
    let data = call.abi_encode();
    let ret = reader.call(to, data.into()).await?;
    if ret.is_empty() {
        return Err(Error::Chain(format!("{method} on {to} returned no data")));
    }
    C::abi_decode_returns(&ret, true).map_err(|e| Error::abi(method, e))
}

/// Current nonce for `(sender, key)` from the entry point
pub async fn get_nonce(
    reader: &dyn ChainStateReader,
    entry_point: Address,
    sender: Address,
    key: U256,
) -> Result<U256> {
    let key = U192::checked_from_limbs_slice(&key.as_limbs()[..3])
        .filter(|_| key.as_limbs()[3] == 0)
        .ok_or(Error::ValueOverflow {
            field: "nonce key",
            bits: 192,
        })?;
    let call = IEntryPoint::getNonceCall { sender, key };
    let decoded = call_contract(reader, entry_point, call, "getNonce").await?;
    debug!(%sender, nonce = %decoded.nonce, "fetched entry point nonce");
    Ok(decoded.nonce)
}

/// `Safe.isModuleEnabled(module)`
pub async fn is_module_enabled(
    reader: &dyn ChainStateReader,
    safe: Address,
    module: Address,
) -> Result<bool> {
    let call = ISafe::isModuleEnabledCall { module };
    Ok(call_contract(reader, safe, call, "isModuleEnabled").await?._0)
}

/// ERC-7579 `isModuleInstalled(moduleTypeId, module, 0x)`
pub async fn is_module_installed(
    reader: &dyn ChainStateReader,
    account: Address,
    module_type: u8,
    module: Address,
) -> Result<bool> {
    let call = IERC7579Account::isModuleInstalledCall {
        moduleTypeId: U256::from(module_type),
        module,
        additionalContext: Bytes::new(),
    };
    Ok(call_contract(reader, account, call, "isModuleInstalled").await?._0)
}

/// `SmartSessions.isPermissionEnabled(permissionId, account)`
pub async fn is_permission_enabled(
    reader: &dyn ChainStateReader,
    smart_sessions: Address,
    permission_id: B256,
    account: Address,
) -> Result<bool> {
    let call = ISmartSessions::isPermissionEnabledCall {
        permissionId: permission_id,
        account,
    };
    Ok(call_contract(reader, smart_sessions, call, "isPermissionEnabled").await?._0)
}

// ============================================================================
// Bundler
// ============================================================================

/// Gas estimate for a UserOperation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    /// Only reported for v0.7 operations with a paymaster
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl GasEstimate {
    /// Parse an `eth_estimateUserOperationGas` result
    pub fn from_rpc(value: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            pre_verification_gas: parse_quantity(&value["preVerificationGas"])?,
            verification_gas_limit: parse_quantity(&value["verificationGasLimit"])?,
            call_gas_limit: parse_quantity(&value["callGasLimit"])?,
            paymaster_verification_gas_limit: optional_quantity(
                &value["paymasterVerificationGasLimit"],
            )?,
            paymaster_post_op_gas_limit: optional_quantity(&value["paymasterPostOpGasLimit"])?,
        })
    }

    /// Copy the estimate into `op`
    pub fn apply(&self, op: &mut UserOperation) {
        op.pre_verification_gas = self.pre_verification_gas;
        op.verification_gas_limit = self.verification_gas_limit;
        op.call_gas_limit = self.call_gas_limit;
        if let Some(pm) = op.paymaster.as_mut() {
            if let Some(limit) = self.paymaster_verification_gas_limit {
                pm.verification_gas_limit = limit;
            }
            if let Some(limit) = self.paymaster_post_op_gas_limit {
                pm.post_op_gas_limit = limit;
            }
        }
    }
}

/// Fee suggestion from the bundler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrices {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Receipt for a confirmed UserOperation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    pub sender: Address,
    pub nonce: U256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub tx_hash: B256,
    pub block_number: u64,
}

impl UserOperationReceipt {
    /// Parse an `eth_getUserOperationReceipt` result
    pub fn from_rpc(user_op_hash: B256, receipt: &serde_json::Value) -> Result<Self> {
        let str_field = |v: &serde_json::Value, name: &'static str| {
            v.as_str()
                .ok_or_else(|| Error::Bundler(format!("receipt field {name} missing")))
                .map(str::to_string)
        };
        let block = str_field(&receipt["receipt"]["blockNumber"], "blockNumber")?;
        Ok(Self {
            user_op_hash,
            sender: parse_address("sender", &str_field(&receipt["sender"], "sender")?)?,
            nonce: parse_quantity(&receipt["nonce"])?,
            success: receipt["success"].as_bool().unwrap_or(false),
            actual_gas_cost: parse_quantity(&receipt["actualGasCost"])?,
            actual_gas_used: parse_quantity(&receipt["actualGasUsed"])?,
            tx_hash: parse_b256(
                "transactionHash",
                &str_field(&receipt["receipt"]["transactionHash"], "transactionHash")?,
            )?,
            block_number: u64::from_str_radix(block.strip_prefix("0x").unwrap_or(&block), 16)
                .map_err(|e| Error::Bundler(format!("invalid block number: {e}")))?,
        })
    }
}

/// ERC-4337 bundler JSON-RPC surface
#[async_trait]
pub trait BundlerClient: Send + Sync {
    /// `eth_estimateUserOperationGas`
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
        version: EntryPointVersion,
    ) -> Result<GasEstimate>;

    /// `eth_sendUserOperation`, returning the operation hash
    async fn send_user_operation(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
        version: EntryPointVersion,
    ) -> Result<B256>;

    /// `eth_getUserOperationReceipt`
    async fn get_user_operation_receipt(&self, hash: B256) -> Result<Option<UserOperationReceipt>>;

    /// Fee suggestion for the next operation
    async fn gas_prices(&self) -> Result<GasPrices>;
}

// ============================================================================
// Paymaster
// ============================================================================

/// Paymaster response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub paymaster: PaymasterFields,
    /// Gas values the paymaster signed over, if it fixes them
    #[serde(default)]
    pub gas: Option<GasEstimate>,
}

/// Gas sponsorship service
#[async_trait]
pub trait PaymasterClient: Send + Sync {
    /// Sponsorship data for `op`; `None` when the paymaster declines
    async fn sponsor(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: ChainId,
    ) -> Result<Option<Sponsorship>>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a JSON-RPC hex quantity
pub fn parse_quantity(value: &serde_json::Value) -> Result<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::Bundler("Expected hex string".into()))?;
    if s == "0x" || s.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(s).map_err(|e| Error::Bundler(format!("Failed to decode quantity {s}: {e}")))
}

fn optional_quantity(value: &serde_json::Value) -> Result<Option<U256>> {
    if value.is_null() {
        Ok(None)
    } else {
        parse_quantity(value).map(Some)
    }
}
