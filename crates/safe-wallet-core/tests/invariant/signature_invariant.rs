//! Invariants of the signature and execution encodings
//!
//! - Estimation stubs have the exact length of the real signature
//! - Owner signatures are concatenated in ascending signer order
//! - Execution modes match the number of calls they carry

use crate::support::{MockChain, ORIGIN, SoftwareAuthenticator};
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolCall;
use safe_wallet_core::{
    Error, SafeAccountConfig, Signer, SigningContext, UserOperation, ValidityWindow,
    contracts::ISafe4337Module,
    execution::{CallType, encode_account_calls, encode_execution_calldata},
    signature::{SafeSignature, build_signature_bytes},
    signer::{EcdsaSigner, PasskeySigner, SmartSessionSigner},
    types::{Call, Signature},
};
use std::sync::Arc;

fn context(window: ValidityWindow) -> SigningContext {
    SigningContext::new(
        SafeAccountConfig::v07().with_chain_id(8453u64).with_erc7579(true),
        Address::repeat_byte(0xac),
    )
    .with_window(window)
}

fn operation(ctx: &SigningContext) -> UserOperation {
    UserOperation::new(ctx.account, U256::from(3), vec![0xde, 0xad])
        .with_gas_prices(2_000_000_000, 1_000_000_000)
}

async fn assert_stub_matches<S: Signer>(signer: &S, ctx: &SigningContext) {
    let stub = signer.stub_signature(ctx).await.unwrap();
    let signed = signer.sign_user_operation(ctx, operation(ctx)).await.unwrap();
    assert_eq!(stub.len(), signed.signature().len(), "{} stub", signer.kind());
}

fn windows() -> Vec<ValidityWindow> {
    vec![
        ValidityWindow::unbounded(),
        ValidityWindow::new(1_700_000_000, 1_800_000_000).unwrap(),
        ValidityWindow::new(0, (1 << 48) - 1).unwrap(),
    ]
}

// ============================================================================
// Stub length
// ============================================================================

#[tokio::test]
async fn test_ecdsa_stub_length_matches() {
    let signer = EcdsaSigner::random();
    for window in windows() {
        assert_stub_matches(&signer, &context(window)).await;
    }
}

#[tokio::test]
async fn test_passkey_stub_length_matches() {
    let authenticator = Arc::new(SoftwareAuthenticator::new(ORIGIN));
    let signer = PasskeySigner::new(authenticator.credential(), authenticator.clone(), ORIGIN);
    for window in windows() {
        assert_stub_matches(&signer, &context(window)).await;
    }
}

#[tokio::test]
async fn test_session_stub_length_matches() {
    let chain = Arc::new(MockChain::new(true));
    chain.deploy();
    let signer = SmartSessionSigner::new(EcdsaSigner::random(), B256::repeat_byte(0x3c), chain);
    for window in windows() {
        assert_stub_matches(&signer, &context(window)).await;
    }
}

// ============================================================================
// Owner ordering
// ============================================================================

fn ecdsa(signer: Address, fill: u8) -> SafeSignature {
    SafeSignature::Ecdsa {
        signer,
        signature: Signature::new([fill; 32], [fill; 32], 0),
    }
}

#[test]
fn test_signatures_sorted_by_signer() {
    let low = Address::repeat_byte(0x01);
    let high = Address::repeat_byte(0xf0);

    let forward = build_signature_bytes(&[ecdsa(low, 0x11), ecdsa(high, 0x22)]);
    let reverse = build_signature_bytes(&[ecdsa(high, 0x22), ecdsa(low, 0x11)]);
    assert_eq!(forward, reverse);
    assert_eq!(forward.len(), 130);
    assert_eq!(forward[0], 0x11);
    assert_eq!(forward[65], 0x22);
}

#[test]
fn test_contract_signature_points_past_static_region() {
    let contract = Address::repeat_byte(0x80);
    let data = Bytes::from(vec![0x5a; 40]);
    let bytes = build_signature_bytes(&[
        SafeSignature::Contract {
            signer: contract,
            data: data.clone(),
        },
        ecdsa(Address::repeat_byte(0x02), 0x33),
    ]);

    // EOA first, then the contract's static part, then length || data
    assert_eq!(bytes[0], 0x33);
    let contract_static = &bytes[65..130];
    assert_eq!(&contract_static[12..32], contract.as_slice());
    let offset = U256::from_be_slice(&contract_static[32..64]).to::<usize>();
    assert_eq!(offset, 130);
    assert_eq!(contract_static[64], 0);
    assert_eq!(U256::from_be_slice(&bytes[offset..offset + 32]), U256::from(40));
    assert_eq!(&bytes[offset + 32..], &data[..]);
}

// ============================================================================
// Execution modes
// ============================================================================

fn call(byte: u8) -> Call {
    Call::new(Address::repeat_byte(byte), U256::from(byte), vec![byte])
}

#[test]
fn test_empty_execution_is_rejected() {
    for call_type in [CallType::Call, CallType::BatchCall, CallType::DelegateCall] {
        assert!(matches!(
            encode_execution_calldata(call_type, &[]),
            Err(Error::EmptyExecution)
        ));
    }
    assert!(matches!(
        encode_account_calls(&SafeAccountConfig::v07(), &[]),
        Err(Error::EmptyExecution)
    ));
}

#[test]
fn test_single_modes_reject_batches() {
    let calls = [call(1), call(2)];
    assert!(matches!(
        encode_execution_calldata(CallType::DelegateCall, &calls),
        Err(Error::ExecutionModeMismatch { mode: "delegatecall", calls: 2 })
    ));
    assert!(matches!(
        encode_execution_calldata(CallType::Call, &calls),
        Err(Error::ExecutionModeMismatch { mode: "call", calls: 2 })
    ));
    assert!(encode_execution_calldata(CallType::BatchCall, &calls[..1]).is_ok());
}

#[test]
fn test_native_safe_single_call_is_direct() {
    let config = SafeAccountConfig::v07();
    let data = encode_account_calls(&config, &[call(7)]).unwrap();
    let decoded = ISafe4337Module::executeUserOpCall::abi_decode(&data, true).unwrap();
    assert_eq!(decoded.to, Address::repeat_byte(7));
    assert_eq!(decoded.operation, 0);

    let data = encode_account_calls(&config, &[call(7), call(8)]).unwrap();
    let decoded = ISafe4337Module::executeUserOpCall::abi_decode(&data, true).unwrap();
    assert_eq!(decoded.to, config.multi_send_call_only);
    assert_eq!(decoded.operation, 1);
    assert_eq!(decoded.value, U256::ZERO);
}
