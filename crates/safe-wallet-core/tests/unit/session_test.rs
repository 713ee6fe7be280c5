//! Unit tests for smart-session construction and encodings

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, address, b256, hex};
use alloy_sol_types::{SolCall, SolValue};
use safe_wallet_core::{
    Error, SafeAccountConfig, SessionParams,
    contracts::{IERC7579Account, ISmartSessions, PolicyData, module_type},
    session::{
        AccountType, ActionPolicy, FALLBACK_TARGET, build_session, decode_use_signature,
        derive_nonce_key, derive_permission_id, encode_use_signature, grant_calls,
        ownable_validator_init_data, session_digest,
    },
};

fn config() -> SafeAccountConfig {
    SafeAccountConfig::v07().with_chain_id(8453u64).with_erc7579(true)
}

fn params() -> SessionParams {
    SessionParams::for_key(Address::repeat_byte(0x55))
        .with_salt(B256::repeat_byte(0x01))
        .with_validity(0, 2_000_000_000)
}

#[test]
fn test_permission_id_vector() {
    let session = build_session(&config(), &params()).unwrap();
    assert_eq!(
        derive_permission_id(&session),
        b256!("6ce44acfc3b85527b788adfa93aa4f6b6f69665cc14f74e659f8ac3198aad198")
    );
}

#[test]
fn test_permission_id_ignores_policies_but_digest_does_not() {
    let plain = build_session(&config(), &params()).unwrap();
    let action = ActionPolicy {
        target: Address::repeat_byte(0x77),
        selector: FixedBytes(hex!("a9059cbb")),
        policies: vec![PolicyData {
            policy: Address::repeat_byte(0x88),
            initData: Bytes::new(),
        }],
    };
    let scoped = build_session(&config(), &params().with_action(action)).unwrap();

    assert_eq!(derive_permission_id(&plain), derive_permission_id(&scoped));
    assert_ne!(session_digest(&plain), session_digest(&scoped));
}

#[test]
fn test_random_salt_when_unset() {
    let unsalted = SessionParams::for_key(Address::repeat_byte(0x55)).with_validity(0, 10);
    let a = build_session(&config(), &unsalted).unwrap();
    let b = build_session(&config(), &unsalted).unwrap();
    assert_ne!(a.salt, b.salt);
    assert_ne!(derive_permission_id(&a), derive_permission_id(&b));
}

#[test]
fn test_default_action_is_sudo_fallback() {
    let session = build_session(&config(), &params()).unwrap();
    assert_eq!(session.actions.len(), 1);
    assert_eq!(session.actions[0].actionTarget, FALLBACK_TARGET);
    assert_eq!(session.userOpPolicies[0].policy, config().time_frame_policy);
    assert!(session.permit4337Paymaster);
}

#[test]
fn test_expired_window_is_rejected() {
    let params = params().with_validity(100, 50);
    assert!(matches!(
        build_session(&config(), &params),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_ownable_init_data_sorts_owners() {
    let a = Address::repeat_byte(0x02);
    let b = Address::repeat_byte(0x01);
    let data = ownable_validator_init_data(1, &[a, b]).unwrap();
    assert_eq!(data, ownable_validator_init_data(1, &[b, a]).unwrap());
    assert!(matches!(
        ownable_validator_init_data(3, &[a, b]),
        Err(Error::InvalidThreshold { .. })
    ));
}

#[test]
fn test_ownable_threshold_counts_distinct_owners() {
    let a = Address::repeat_byte(0x0a);
    assert!(matches!(
        ownable_validator_init_data(2, &[a, a]),
        Err(Error::InvalidThreshold { threshold: 2, owners: 1 })
    ));

    let data = ownable_validator_init_data(1, &[a, a]).unwrap();
    let (threshold, owners) = <(U256, Vec<Address>)>::abi_decode_params(&data, true).unwrap();
    assert_eq!(threshold, U256::from(1));
    assert_eq!(owners, vec![a]);
}

#[test]
fn test_nonce_keys_per_account_type() {
    let validator = address!("00000000002B0eCfbD0496EE71e01257dA0E37DE");
    let safe = derive_nonce_key(AccountType::Safe, validator);
    assert_eq!(
        safe.to_be_bytes::<32>()[8..],
        hex!("00000000002B0eCfbD0496EE71e01257dA0E37DE00000000")
    );
    assert_eq!(derive_nonce_key(AccountType::Nexus, validator), safe);

    let kernel = derive_nonce_key(AccountType::Kernel, validator);
    assert_eq!(
        kernel.to_be_bytes::<32>()[8..],
        hex!("000100000000002B0eCfbD0496EE71e01257dA0E37DE0000")
    );
    assert!(kernel < U256::from(1) << 192);
}

#[test]
fn test_use_envelope() {
    let pid = B256::repeat_byte(0x0e);
    let envelope = encode_use_signature(pid, &[0xab; 65]);
    assert_eq!(envelope.len(), 1 + 32 + 65);
    assert_eq!(envelope[0], 0x00);

    let (decoded_pid, inner) = decode_use_signature(&envelope).unwrap();
    assert_eq!(decoded_pid, pid);
    assert_eq!(inner, &[0xab; 65][..]);

    let mut enable = envelope.to_vec();
    enable[0] = 0x01;
    assert!(matches!(decode_use_signature(&enable), Err(Error::NotSupported(_))));
    assert!(matches!(
        decode_use_signature(&envelope[..20]),
        Err(Error::InvalidLength { .. })
    ));
}

#[test]
fn test_grant_installs_module_only_when_missing() {
    let account = Address::repeat_byte(0x44);
    let session = build_session(&config(), &params()).unwrap();

    let calls = grant_calls(&config(), account, session.clone(), false);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].to, account);
    let install = IERC7579Account::installModuleCall::abi_decode(&calls[0].data, true).unwrap();
    assert_eq!(install.moduleTypeId, U256::from(module_type::VALIDATOR));
    assert_eq!(install.module, config().smart_sessions);

    let calls = grant_calls(&config(), account, session.clone(), true);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, config().smart_sessions);
    let enable = ISmartSessions::enableSessionsCall::abi_decode(&calls[0].data, true).unwrap();
    assert_eq!(enable.sessions, vec![session]);
}
