//! Wallet JSON-RPC surface
//!
//! Serves the standard signing methods and the EIP-5792 / ERC-7715
//! capability methods on top of a [`SmartAccountClient`]. Responses use
//! hex quantities and the `PENDING` / `CONFIRMED` status strings dapps
//! expect.

use crate::chain::{UserOperationReceipt, is_module_installed};
use crate::client::SmartAccountClient;
use crate::contracts::module_type;
use crate::session::{SessionParams, build_session, derive_permission_id, grant_calls};
use crate::signer::Signer;
use crate::types::{Call, decode_hex, parse_address, parse_b256, parse_u256};
use crate::{Error, Result};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Methods answered by [`WalletRpcHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletRpcMethod {
    SendTransaction,
    Sign,
    PersonalSign,
    SignTypedDataV4,
    GetCapabilities,
    SendCalls,
    GetCallsStatus,
    GrantPermissions,
}

impl WalletRpcMethod {
    pub const ALL: [WalletRpcMethod; 8] = [
        WalletRpcMethod::SendTransaction,
        WalletRpcMethod::Sign,
        WalletRpcMethod::PersonalSign,
        WalletRpcMethod::SignTypedDataV4,
        WalletRpcMethod::GetCapabilities,
        WalletRpcMethod::SendCalls,
        WalletRpcMethod::GetCallsStatus,
        WalletRpcMethod::GrantPermissions,
    ];

    /// JSON-RPC method name
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletRpcMethod::SendTransaction => "eth_sendTransaction",
            WalletRpcMethod::Sign => "eth_sign",
            WalletRpcMethod::PersonalSign => "personal_sign",
            WalletRpcMethod::SignTypedDataV4 => "eth_signTypedData_v4",
            WalletRpcMethod::GetCapabilities => "wallet_getCapabilities",
            WalletRpcMethod::SendCalls => "wallet_sendCalls",
            WalletRpcMethod::GetCallsStatus => "wallet_getCallsStatus",
            WalletRpcMethod::GrantPermissions => "wallet_grantPermissions",
        }
    }
}

impl fmt::Display for WalletRpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletRpcMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidRequest(format!("unsupported method {s}")))
    }
}

/// Status of a `wallet_sendCalls` bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallsStatus {
    Pending,
    Confirmed,
}

/// `wallet_getCallsStatus` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsStatusResponse {
    pub status: CallsStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receipts: Vec<CallReceipt>,
}

/// Receipt entry in a calls status response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    /// `0x1` on success, `0x0` on revert
    pub status: String,
    pub block_number: String,
    pub gas_used: String,
    pub transaction_hash: B256,
}

impl From<&UserOperationReceipt> for CallReceipt {
    fn from(receipt: &UserOperationReceipt) -> Self {
        Self {
            status: if receipt.success { "0x1" } else { "0x0" }.to_string(),
            block_number: format!("{:#x}", receipt.block_number),
            gas_used: format!("{:#x}", receipt.actual_gas_used),
            transaction_hash: receipt.tx_hash,
        }
    }
}

/// Call entry of `eth_sendTransaction` / `wallet_sendCalls`
#[derive(Debug, Clone, Deserialize)]
struct RpcCall {
    to: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

impl RpcCall {
    fn into_call(self) -> Result<Call> {
        let to = parse_address("to", &self.to)?;
        let value = match &self.value {
            Some(v) => parse_u256("value", v)?,
            None => U256::ZERO,
        };
        let data = match &self.data {
            Some(d) => Bytes::from(decode_hex("data", d)?),
            None => Bytes::new(),
        };
        Ok(Call::new(to, value, data))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCallsRequest {
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    calls: Vec<RpcCall>,
}

#[derive(Debug, Clone, Deserialize)]
struct PermissionSigner {
    data: PermissionSignerData,
}

#[derive(Debug, Clone, Deserialize)]
struct PermissionSignerData {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GrantPermissionsRequest {
    signer: PermissionSigner,
    expiry: u64,
    #[serde(default)]
    permissions: Value,
}

/// Serves wallet RPC requests for one account
pub struct WalletRpcHandler<S: Signer> {
    client: SmartAccountClient<S>,
}

impl<S: Signer> WalletRpcHandler<S> {
    pub fn new(client: SmartAccountClient<S>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SmartAccountClient<S> {
        &self.client
    }

    /// Dispatch one request
    ///
    /// # Arguments
    /// * `method` - JSON-RPC method name
    /// * `params` - Positional params array
    ///
    /// # Returns
    /// The JSON-RPC `result` value
    #[instrument(skip(self, params))]
    pub async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        let method: WalletRpcMethod = method.parse()?;
        debug!(%method, "handling wallet request");
        match method {
            WalletRpcMethod::SendTransaction => {
                let call: RpcCall = param(&params, 0)?;
                let hash = self.client.send_calls(&[call.into_call()?]).await?;
                Ok(json!(hash))
            }
            WalletRpcMethod::Sign => {
                let address: String = param(&params, 0)?;
                let message: String = param(&params, 1)?;
                self.sign_message(&address, &decode_hex("message", &message)?)
                    .await
            }
            WalletRpcMethod::PersonalSign => {
                let message: String = param(&params, 0)?;
                let address: String = param(&params, 1)?;
                self.sign_message(&address, &personal_message_bytes(&message))
                    .await
            }
            WalletRpcMethod::SignTypedDataV4 => {
                let address: String = param(&params, 0)?;
                let typed_data = typed_data_param(&params, 1)?;
                let ctx = self.client.signing_context().await;
                let signer = self.client.signer();
                signer.ensure_can_sign(&ctx, parse_address("address", &address)?)?;
                let signature = signer.sign_typed_data(&ctx, &typed_data).await?;
                Ok(json!(signature))
            }
            WalletRpcMethod::GetCapabilities => self.capabilities().await,
            WalletRpcMethod::SendCalls => {
                let request: SendCallsRequest = param(&params, 0)?;
                self.send_calls(request).await
            }
            WalletRpcMethod::GetCallsStatus => {
                let id: String = param(&params, 0)?;
                let status = self.calls_status(parse_b256("id", &id)?).await?;
                Ok(serde_json::to_value(status)?)
            }
            WalletRpcMethod::GrantPermissions => {
                let request: GrantPermissionsRequest = param(&params, 0)?;
                self.grant_permissions(request).await
            }
        }
    }

    async fn sign_message(&self, address: &str, message: &[u8]) -> Result<Value> {
        let ctx = self.client.signing_context().await;
        let signer = self.client.signer();
        signer.ensure_can_sign(&ctx, parse_address("address", address)?)?;
        Ok(json!(signer.sign_message(&ctx, message).await?))
    }

    async fn capabilities(&self) -> Result<Value> {
        let ctx = self.client.signing_context().await;
        let config = &ctx.config;
        let chain_id = config.chain_id()?;
        Ok(json!({
            (chain_id.to_hex()): {
                "atomicBatch": { "supported": true },
                "paymasterService": { "supported": true },
                "permissions": {
                    "supported": config.erc7579,
                    "signerTypes": ["keys"],
                    "permissionTypes": ["contract-call"],
                    "policyTypes": ["sudo", "time-frame"],
                },
            }
        }))
    }

    async fn send_calls(&self, request: SendCallsRequest) -> Result<Value> {
        let ctx = self.client.signing_context().await;
        if let Some(chain) = &request.chain_id {
            let requested = parse_u256("chainId", chain)?;
            if requested != U256::from(ctx.config.chain_id()?.0) {
                return Err(Error::InvalidRequest(format!(
                    "chain {requested} does not match account chain {}",
                    ctx.config.chain_id()?
                )));
            }
        }
        if let Some(from) = &request.from {
            let from = parse_address("from", from)?;
            if from != ctx.account {
                return Err(Error::CannotSignForAddress {
                    requested: from,
                    signer: ctx.account,
                });
            }
        }
        let calls = request
            .calls
            .into_iter()
            .map(RpcCall::into_call)
            .collect::<Result<Vec<_>>>()?;
        let hash = self.client.send_calls(&calls).await?;
        Ok(json!({ "id": hash }))
    }

    /// Status of the operation submitted under `id`
    pub async fn calls_status(&self, id: B256) -> Result<CallsStatusResponse> {
        Ok(match self.client.get_receipt(id).await? {
            Some(receipt) => CallsStatusResponse {
                status: CallsStatus::Confirmed,
                receipts: vec![CallReceipt::from(&receipt)],
            },
            None => CallsStatusResponse {
                status: CallsStatus::Pending,
                receipts: Vec::new(),
            },
        })
    }

    async fn grant_permissions(&self, request: GrantPermissionsRequest) -> Result<Value> {
        let account = self.client.account().await;
        let config = account.config();
        if !config.erc7579 {
            return Err(Error::InvalidConfig(
                "permissions require an ERC-7579 account".into(),
            ));
        }
        let session_key = parse_address("signer", &request.signer.data.id)?;
        let params = SessionParams::for_key(session_key).with_validity(0, request.expiry);
        let session = build_session(config, &params)?;
        let permission_id = derive_permission_id(&session);

        let installed = account.is_deployed()
            && is_module_installed(
                self.client.reader(),
                account.address(),
                module_type::VALIDATOR,
                config.smart_sessions,
            )
            .await?;
        let calls = grant_calls(config, account.address(), session, installed);
        let hash = self.client.send_calls(&calls).await?;

        Ok(json!({
            "permissionsContext": permission_id,
            "expiry": request.expiry,
            "signer": { "type": "key", "data": { "id": session_key } },
            "permissions": request.permissions,
            "userOpHash": hash,
        }))
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &Value, index: usize) -> Result<T> {
    let value = params
        .get(index)
        .ok_or_else(|| Error::InvalidRequest(format!("missing param {index}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Error::InvalidRequest(format!("param {index}: {e}")))
}

/// Typed data arrives either as an object or as a JSON string
fn typed_data_param(params: &Value, index: usize) -> Result<TypedData> {
    match params.get(index) {
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| Error::InvalidRequest(format!("typed data: {e}"))),
        Some(_) => param(params, index),
        None => Err(Error::InvalidRequest(format!("missing param {index}"))),
    }
}

/// `personal_sign` messages are hex when they look like hex, text otherwise
fn personal_message_bytes(message: &str) -> Vec<u8> {
    match message.strip_prefix("0x") {
        Some(hex_body) => hex::decode(hex_body).unwrap_or_else(|_| message.as_bytes().to_vec()),
        None => message.as_bytes().to_vec(),
    }
}
