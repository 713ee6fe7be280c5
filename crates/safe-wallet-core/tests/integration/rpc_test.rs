//! Integration tests for the wallet JSON-RPC handler

use crate::support::{MockBundler, MockChain};
use alloy_primitives::{Address, B256, U256};
use safe_wallet_core::{
    Error, InitializerParams, SafeAccountConfig, SmartAccount, SmartAccountClient,
    WalletRpcHandler,
    execution::decode_execute,
    signer::EcdsaSigner,
};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;

fn handler(
    config: SafeAccountConfig,
    bundler: MockBundler,
) -> (WalletRpcHandler<EcdsaSigner>, Arc<MockBundler>) {
    let owner = EcdsaSigner::random();
    let account = SmartAccount::counterfactual(
        config,
        &InitializerParams::single_owner(owner.address()),
        U256::ZERO,
    )
    .unwrap();
    let bundler = Arc::new(bundler);
    let client = SmartAccountClient::new(account, owner, Arc::new(MockChain::new(false)), bundler.clone());
    (WalletRpcHandler::new(client), bundler)
}

fn base() -> SafeAccountConfig {
    SafeAccountConfig::v07().with_chain_id(8453u64)
}

async fn account_hex(handler: &WalletRpcHandler<EcdsaSigner>) -> String {
    handler.client().address().await.to_string()
}

#[tokio::test]
async fn test_capabilities_keyed_by_chain() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let caps = handler.handle("wallet_getCapabilities", json!([])).await.unwrap();
    assert_eq!(caps["0x2105"]["atomicBatch"]["supported"], true);
    assert_eq!(caps["0x2105"]["permissions"]["supported"], false);
}

#[tokio::test]
async fn test_personal_sign_for_account() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let account = account_hex(&handler).await;

    let signature = handler
        .handle("personal_sign", json!(["0x68656c6c6f", account]))
        .await
        .unwrap();
    let hex = signature.as_str().unwrap();
    assert_eq!(hex.len(), 2 + 65 * 2);
}

#[tokio::test]
async fn test_sign_for_foreign_address_is_rejected() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let stranger = Address::repeat_byte(0x99).to_string();
    let err = handler
        .handle("eth_sign", json!([stranger, "0x1234"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotSignForAddress { .. }));
}

#[tokio::test]
async fn test_sign_typed_data_accepts_string_payload() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let account = account_hex(&handler).await;
    let typed = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "chainId", "type": "uint256" }
            ],
            "Mail": [{ "name": "contents", "type": "string" }]
        },
        "primaryType": "Mail",
        "domain": { "name": "Test", "chainId": 8453 },
        "message": { "contents": "hi" }
    });

    let from_object = handler
        .handle("eth_signTypedData_v4", json!([account, typed]))
        .await
        .unwrap();
    let from_string = handler
        .handle("eth_signTypedData_v4", json!([account, typed.to_string()]))
        .await
        .unwrap();
    assert_eq!(from_object, from_string);
}

#[tokio::test]
async fn test_send_calls_then_status() {
    let (handler, bundler) = handler(base(), MockBundler::new(8453u64).with_pending_polls(1));
    let account = account_hex(&handler).await;

    let result = handler
        .handle(
            "wallet_sendCalls",
            json!([{
                "chainId": "0x2105",
                "from": account,
                "calls": [
                    { "to": Address::repeat_byte(1).to_string(), "value": "0x1" },
                    { "to": Address::repeat_byte(2).to_string(), "data": "0xabcd" }
                ]
            }]),
        )
        .await
        .unwrap();
    let id = result["id"].as_str().unwrap().to_string();
    assert_eq!(bundler.sent().len(), 1);

    let pending = handler.handle("wallet_getCallsStatus", json!([id])).await.unwrap();
    assert_eq!(pending["status"], "PENDING");

    let confirmed = handler.handle("wallet_getCallsStatus", json!([id])).await.unwrap();
    assert_eq!(confirmed["status"], "CONFIRMED");
    assert_eq!(confirmed["receipts"][0]["status"], "0x1");
}

#[tokio::test]
async fn test_send_calls_on_other_chain_is_rejected() {
    let (handler, bundler) = handler(base(), MockBundler::new(8453u64));
    let err = handler
        .handle(
            "wallet_sendCalls",
            json!([{ "chainId": "0x1", "calls": [{ "to": Address::ZERO.to_string() }] }]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert!(bundler.sent().is_empty());
}

#[tokio::test]
async fn test_send_transaction_returns_operation_hash() {
    let (handler, bundler) = handler(base(), MockBundler::new(8453u64));
    let result = handler
        .handle(
            "eth_sendTransaction",
            json!([{ "to": Address::repeat_byte(3).to_string(), "value": "0x10" }]),
        )
        .await
        .unwrap();
    let hash = B256::from_str(result.as_str().unwrap()).unwrap();
    let sent = bundler.sent().remove(0);
    assert_eq!(
        hash,
        sent.hash(
            handler.client().account().await.config().entry_point_version,
            handler.client().account().await.config().entry_point,
            8453u64
        )
        .unwrap()
    );
}

#[tokio::test]
async fn test_grant_permissions_installs_and_enables() {
    let config = base().with_erc7579(true);
    let (handler, bundler) = handler(config.clone(), MockBundler::new(8453u64));
    let session_key = Address::repeat_byte(0x5e);

    let result = handler
        .handle(
            "wallet_grantPermissions",
            json!([{
                "signer": { "type": "key", "data": { "id": session_key.to_string() } },
                "expiry": 2_000_000_000u64,
                "permissions": [{ "type": "sudo" }]
            }]),
        )
        .await
        .unwrap();
    assert_eq!(result["permissionsContext"].as_str().unwrap().len(), 66);
    assert_eq!(result["expiry"], 2_000_000_000u64);

    let sent = bundler.sent().remove(0);
    let (_, calls) = decode_execute(&sent.call_data).unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].to, sent.sender);
    assert_eq!(calls[1].to, config.smart_sessions);
}

#[tokio::test]
async fn test_grant_permissions_requires_erc7579() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let err = handler
        .handle(
            "wallet_grantPermissions",
            json!([{ "signer": { "data": { "id": Address::ZERO.to_string() } }, "expiry": 1 }]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[tokio::test]
async fn test_unknown_method() {
    let (handler, _) = handler(base(), MockBundler::new(8453u64));
    let err = handler
        .handle("eth_sendRawTransaction", Value::Array(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}
