//! Unit tests for Safe setup payloads and address prediction

use alloy_primitives::{Address, U256, address};
use alloy_sol_types::SolCall;
use safe_wallet_core::{
    Error, InitializerParams, SafeAccountConfig, SmartAccount,
    account::{
        Initializer, MetaTransaction, Operation, create2_address, predict_address_hex,
        multisend::decode_multi_send,
    },
    config::{SAFE_4337_MODULE_V07, SAFE_MODULE_SETUP_V07},
    contracts::{ISafe, ISafe7579, ISafeModuleSetup, ISafeWebAuthnSharedSigner},
    types::keccak256,
    webauthn::P256PublicKey,
};

fn owner() -> Address {
    address!("0000000000000000000000000000000000000001")
}

// ============================================================================
// Golden address
// ============================================================================

#[test]
fn test_single_owner_v07_golden_address() {
    let account = SmartAccount::counterfactual(
        SafeAccountConfig::v07(),
        &InitializerParams::single_owner(owner()),
        U256::ZERO,
    )
    .unwrap();

    assert_eq!(
        account.address(),
        address!("3163753b7eced7a354a36115124e0474a6cc1e08")
    );
}

#[test]
fn test_hex_prediction_matches_typed_prediction() {
    let config = SafeAccountConfig::v07();
    let initializer =
        Initializer::build(&config, &InitializerParams::single_owner(owner())).unwrap();

    let predicted = predict_address_hex(
        &config.proxy_factory.to_string(),
        &config.proxy_creation_code.to_string(),
        &config.safe_singleton.to_string(),
        &initializer.encode().to_string(),
        U256::ZERO,
    )
    .unwrap();
    assert_eq!(predicted, address!("3163753b7eced7a354a36115124e0474a6cc1e08"));
}

#[test]
fn test_salt_nonce_changes_address() {
    let params = InitializerParams::single_owner(owner());
    let a = SmartAccount::counterfactual(SafeAccountConfig::v07(), &params, U256::ZERO).unwrap();
    let b = SmartAccount::counterfactual(SafeAccountConfig::v07(), &params, U256::from(1)).unwrap();
    assert_ne!(a.address(), b.address());
}

#[test]
fn test_create2_eip1014_example_0() {
    let addr = create2_address(Address::ZERO, Default::default(), keccak256([0x00]));
    assert_eq!(addr, address!("4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38"));
}

// ============================================================================
// Setup payload
// ============================================================================

#[test]
fn test_single_module_setup_skips_multisend() {
    let config = SafeAccountConfig::v07();
    let initializer =
        Initializer::build(&config, &InitializerParams::single_owner(owner())).unwrap();

    assert!(!initializer.uses_multi_send());
    let setup = ISafe::setupCall::abi_decode(&initializer.encode(), true).unwrap();
    assert_eq!(setup._owners, vec![owner()]);
    assert_eq!(setup._threshold, U256::from(1));
    assert_eq!(setup.to, SAFE_MODULE_SETUP_V07);
    assert_eq!(setup.fallbackHandler, SAFE_4337_MODULE_V07);

    let enable = ISafeModuleSetup::enableModulesCall::abi_decode(&setup.data, true).unwrap();
    assert_eq!(enable.modules, vec![SAFE_4337_MODULE_V07]);
}

#[test]
fn test_passkey_setup_routes_through_multisend() {
    let config = SafeAccountConfig::v07();
    let passkey = P256PublicKey {
        x: U256::from(11),
        y: U256::from(22),
    };
    let initializer =
        Initializer::build(&config, &InitializerParams::passkey_owner(passkey)).unwrap();

    assert!(initializer.uses_multi_send());
    assert_eq!(initializer.owners, vec![config.webauthn_shared_signer]);

    let setup = ISafe::setupCall::abi_decode(&initializer.encode(), true).unwrap();
    assert_eq!(setup.to, config.multi_send);

    let txs = decode_multi_send(&setup.data).unwrap();
    assert_eq!(txs.len(), 2);
    assert!(txs.iter().all(|tx| tx.operation == Operation::DelegateCall));
    assert_eq!(txs[1].to, config.webauthn_shared_signer);
    let configure =
        ISafeWebAuthnSharedSigner::configureCall::abi_decode(&txs[1].data, true).unwrap();
    assert_eq!(configure.signer.x, U256::from(11));
    assert_eq!(configure.signer.y, U256::from(22));
}

#[test]
fn test_erc7579_setup_sorts_attesters() {
    let high = Address::repeat_byte(0xf0);
    let low = Address::repeat_byte(0x01);
    let config = SafeAccountConfig::v07()
        .with_erc7579(true)
        .with_attesters(vec![high, low], 1);
    let params = InitializerParams::single_owner(owner())
        .with_extra_transaction(MetaTransaction::call(Address::repeat_byte(9), U256::ZERO, Vec::<u8>::new()));
    let initializer = Initializer::build(&config, &params).unwrap();

    assert_eq!(initializer.transactions.len(), 3);
    let init = &initializer.transactions[1];
    assert_eq!(init.operation, Operation::Call);
    assert_eq!(init.to, config.safe_7579);

    let decoded = ISafe7579::initializeAccountCall::abi_decode(&init.data, true).unwrap();
    assert_eq!(decoded.registryInit.attesters, vec![low, high]);
    assert_eq!(initializer.transactions[2].to, Address::repeat_byte(9));
}

#[test]
fn test_setup_rejects_bad_owner_sets() {
    let config = SafeAccountConfig::v07();
    assert!(matches!(
        Initializer::build(&config, &InitializerParams::default()),
        Err(Error::MissingOwner)
    ));
    assert!(matches!(
        Initializer::build(&config, &InitializerParams::single_owner(owner()).with_threshold(2)),
        Err(Error::InvalidThreshold { threshold: 2, owners: 1 })
    ));
}
