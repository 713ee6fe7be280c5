//! Integration tests for the prepare / sign / submit / confirm lifecycle
//!
//! Every signer variant is driven through [`SmartAccountClient`] against the
//! in-memory chain and bundler.

use crate::support::{MockBundler, MockChain, MockPaymaster, ORIGIN, SoftwareAuthenticator};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use safe_wallet_core::{
    AccountState, Error, ErrorKind, InitializerParams, SafeAccountConfig, Signer, SmartAccount,
    SmartAccountClient, ValidityWindow,
    contracts::{ISafe4337Module, ISmartSessions},
    session::{AccountType, decode_use_signature, derive_nonce_key},
    signature::safe_op_hash,
    signer::{EcdsaSigner, PasskeySigner, SmartSessionSigner, recover_address},
    types::{Call, Signature},
};
use std::sync::Arc;
use std::time::Duration;

const CHAIN: u64 = 8453;

fn ecdsa_client(
    config: SafeAccountConfig,
) -> (SmartAccountClient<EcdsaSigner>, Arc<MockChain>, Arc<MockBundler>) {
    let owner = EcdsaSigner::random();
    let account = SmartAccount::counterfactual(
        config,
        &InitializerParams::single_owner(owner.address()),
        U256::ZERO,
    )
    .unwrap();
    let chain = Arc::new(MockChain::new(true));
    let bundler = Arc::new(MockBundler::new(CHAIN));
    let client = SmartAccountClient::new(account, owner, chain.clone(), bundler.clone());
    (client, chain, bundler)
}

fn transfer() -> Call {
    Call::transfer(Address::repeat_byte(0xbb), U256::from(1_000))
}

// ============================================================================
// ECDSA owner
// ============================================================================

#[tokio::test]
async fn test_first_operation_deploys_and_confirms() {
    let (client, _chain, bundler) =
        ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));

    let prepared = client.prepare_user_operation(&[transfer()]).await.unwrap();
    assert!(prepared.is_deployment());
    assert_eq!(prepared.nonce, U256::ZERO);
    assert_eq!(prepared.call_gas_limit, bundler.estimate.call_gas_limit);
    assert_eq!(prepared.max_fee_per_gas, bundler.prices.max_fee_per_gas);

    let executed = ISafe4337Module::executeUserOpCall::abi_decode(&prepared.call_data, true).unwrap();
    assert_eq!(executed.to, Address::repeat_byte(0xbb));
    assert_eq!(executed.value, U256::from(1_000));

    let hash = client.send_calls(&[transfer()]).await.unwrap();
    assert_eq!(bundler.sent().len(), 1);
    assert!(!client.account().await.is_deployed());

    let receipt = client
        .wait_for_receipt(hash, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(receipt.success);
    assert_eq!(client.account().await.state(), AccountState::Deployed);
}

#[tokio::test]
async fn test_ecdsa_signature_recovers_owner() {
    let (client, _chain, bundler) =
        ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));
    let window = ValidityWindow::new(1_700_000_000, 1_800_000_000).unwrap();
    let client = client.with_validity_window(window);

    client.send_calls(&[transfer()]).await.unwrap();
    let sent = bundler.sent().remove(0);

    let (signed_window, owners) = ValidityWindow::split(sent.signature()).unwrap();
    assert_eq!(signed_window, window);
    assert_eq!(owners.len(), 65);

    let config = client.account().await.config().clone();
    let hash = safe_op_hash(&config, sent.operation(), window).unwrap();
    let signature = Signature::from_rsv_bytes(owners).unwrap();
    assert_eq!(
        recover_address(hash, &signature).unwrap(),
        client.signer().address()
    );

    let estimated = bundler.estimated().remove(0);
    assert_eq!(estimated.signature.len(), sent.signature().len());
}

#[tokio::test]
async fn test_deployed_account_reads_nonce_and_skips_factory() {
    let (client, chain, _bundler) =
        ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));
    chain.deploy();
    chain.set_nonce(U256::from(7));

    let op = client.prepare_user_operation(&[transfer(), transfer()]).await.unwrap();
    assert!(!op.is_deployment());
    assert_eq!(op.nonce, U256::from(7));

    let executed = ISafe4337Module::executeUserOpCall::abi_decode(&op.call_data, true).unwrap();
    assert_eq!(executed.operation, 1);
}

#[tokio::test]
async fn test_missing_chain_id_fails_before_collaborators() {
    let (client, _chain, bundler) = ecdsa_client(SafeAccountConfig::v07());
    let err = client.prepare_user_operation(&[transfer()]).await.unwrap_err();
    assert!(matches!(err, Error::MissingChainId));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(bundler.estimated().is_empty());
}

#[tokio::test]
async fn test_paymaster_sponsorship_is_attached() {
    let (client, _chain, bundler) =
        ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));
    let paymaster = Address::repeat_byte(0x9a);
    let client = client.with_paymaster(Arc::new(MockPaymaster { address: paymaster }));

    let op = client.prepare_user_operation(&[transfer()]).await.unwrap();
    let fields = op.paymaster.as_ref().unwrap();
    assert_eq!(fields.paymaster, paymaster);
    assert_eq!(fields.verification_gas_limit, U256::from(60_000));
    assert_eq!(bundler.estimated()[0].paymaster.as_ref().unwrap().paymaster, paymaster);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_receipt_times_out() {
    let (client, _chain, bundler) =
        ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));
    let err = client
        .wait_for_receipt(B256::repeat_byte(0x42), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Bundler(_)));
    assert!(bundler.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_receipt_polls_until_included() {
    let owner = EcdsaSigner::random();
    let account = SmartAccount::counterfactual(
        SafeAccountConfig::v07().with_chain_id(CHAIN),
        &InitializerParams::single_owner(owner.address()),
        U256::ZERO,
    )
    .unwrap();
    let bundler = Arc::new(MockBundler::new(CHAIN).with_pending_polls(3));
    let client = SmartAccountClient::new(account, owner, Arc::new(MockChain::new(true)), bundler)
        .with_poll_interval(Duration::from_millis(500));

    let hash = client.send_calls(&[transfer()]).await.unwrap();
    let receipt = client
        .wait_for_receipt(hash, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(receipt.user_op_hash, hash);
}

// ============================================================================
// Passkey owner
// ============================================================================

#[tokio::test]
async fn test_passkey_flow_signs_with_shared_signer() {
    let authenticator = Arc::new(SoftwareAuthenticator::new(ORIGIN));
    let config = SafeAccountConfig::v07().with_chain_id(CHAIN);
    let signer = PasskeySigner::register(authenticator.clone(), &config, "safe.global", "alice", ORIGIN)
        .await
        .unwrap();
    assert_eq!(signer.credential(), &authenticator.credential());

    let account = SmartAccount::counterfactual(
        config.clone(),
        &InitializerParams::passkey_owner(authenticator.public_key()),
        U256::ZERO,
    )
    .unwrap();
    let bundler = Arc::new(MockBundler::new(CHAIN));
    let client = SmartAccountClient::new(account, signer, Arc::new(MockChain::new(true)), bundler.clone());

    client.send_calls(&[transfer()]).await.unwrap();
    let sent = bundler.sent().remove(0);
    let estimated = bundler.estimated().remove(0);
    assert_eq!(estimated.signature.len(), sent.signature().len());

    let (_, owners) = ValidityWindow::split(sent.signature()).unwrap();
    assert_eq!(&owners[12..32], config.webauthn_shared_signer.as_slice());
    assert_eq!(U256::from_be_slice(&owners[32..64]), U256::from(65));
    assert_eq!(owners[64], 0);
}

// ============================================================================
// Session key
// ============================================================================

#[tokio::test]
async fn test_session_key_flow_uses_validator_nonce_key() {
    let config = SafeAccountConfig::v07().with_chain_id(CHAIN).with_erc7579(true);
    let owner = Address::repeat_byte(0x01);
    let account = SmartAccount::counterfactual(
        config.clone(),
        &InitializerParams::single_owner(owner),
        U256::ZERO,
    )
    .unwrap();
    let chain = Arc::new(MockChain::new(true));
    chain.deploy();

    let permission_id = B256::repeat_byte(0x3c);
    let signer = SmartSessionSigner::new(EcdsaSigner::random(), permission_id, chain.clone());
    let bundler = Arc::new(MockBundler::new(CHAIN));
    let client = SmartAccountClient::new(account, signer, chain.clone(), bundler.clone());

    client.send_calls(&[transfer()]).await.unwrap();
    let sent = bundler.sent().remove(0);

    assert_eq!(
        sent.nonce_key(),
        derive_nonce_key(AccountType::Safe, config.smart_sessions)
    );
    let (pid, inner) = decode_use_signature(sent.signature()).unwrap();
    assert_eq!(pid, permission_id);
    assert_eq!(inner.len(), 65);
    assert_eq!(
        bundler.estimated()[0].signature.len(),
        sent.signature().len()
    );
    assert_eq!(chain.calls_to(ISmartSessions::isPermissionEnabledCall::SELECTOR), 1);
}

#[tokio::test]
async fn test_session_key_without_permission_leaves_op_unsigned() {
    let config = SafeAccountConfig::v07().with_chain_id(CHAIN).with_erc7579(true);
    let account = SmartAccount::counterfactual(
        config,
        &InitializerParams::single_owner(Address::repeat_byte(0x01)),
        U256::ZERO,
    )
    .unwrap();
    let chain = Arc::new(MockChain::new(false));
    let signer = SmartSessionSigner::new(EcdsaSigner::random(), B256::repeat_byte(1), chain.clone());
    let bundler = Arc::new(MockBundler::new(CHAIN));
    let client = SmartAccountClient::new(account, signer, chain, bundler.clone());

    let op = client.prepare_user_operation(&[transfer()]).await.unwrap();
    let err = client.sign_user_operation(op).await.unwrap_err();
    assert!(matches!(err, Error::PermissionNotInstalled(_)));
    assert_eq!(err.kind(), ErrorKind::Signer);
    assert!(bundler.sent().is_empty());
}

#[tokio::test]
async fn test_session_key_follows_permission_toggle() {
    let config = SafeAccountConfig::v07().with_chain_id(CHAIN).with_erc7579(true);
    let account = SmartAccount::counterfactual(
        config,
        &InitializerParams::single_owner(Address::repeat_byte(0x01)),
        U256::ZERO,
    )
    .unwrap();
    let chain = Arc::new(MockChain::new(false));
    chain.deploy();
    let permission_id = B256::repeat_byte(0x4d);
    let signer = SmartSessionSigner::new(EcdsaSigner::random(), permission_id, chain.clone());
    let bundler = Arc::new(MockBundler::new(CHAIN));
    let client = SmartAccountClient::new(account, signer, chain.clone(), bundler.clone());

    let op = client.prepare_user_operation(&[transfer()]).await.unwrap();
    let err = client.sign_user_operation(op.clone()).await.unwrap_err();
    assert!(matches!(err, Error::PermissionNotInstalled(pid) if pid == permission_id));

    chain.set_enabled(true);
    let signed = client.sign_user_operation(op.clone()).await.unwrap();
    let (pid, _) = decode_use_signature(signed.signature()).unwrap();
    assert_eq!(pid, permission_id);

    chain.set_enabled(false);
    assert!(matches!(
        client.sign_user_operation(op).await,
        Err(Error::PermissionNotInstalled(_))
    ));
    assert_eq!(chain.calls_to(ISmartSessions::isPermissionEnabledCall::SELECTOR), 3);
    assert!(bundler.sent().is_empty());
}

#[tokio::test]
async fn test_signer_kinds() {
    let (client, _, _) = ecdsa_client(SafeAccountConfig::v07().with_chain_id(CHAIN));
    assert_eq!(client.signer().kind().to_string(), "ecdsa");
}
