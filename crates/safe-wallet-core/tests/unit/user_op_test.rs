//! Unit tests for user operation packing, hashing and RPC format

use alloy_primitives::{Address, Bytes, U256, b256, hex};
use safe_wallet_core::{
    EntryPointVersion, Error, UserOperation,
    config::{ENTRY_POINT_V06, ENTRY_POINT_V07},
    user_op::{
        PaymasterFields,
        packing::{PAYMASTER_HEADER_LEN, unpack_paymaster_and_data, unpack_u128_pair},
    },
};

fn sample_op() -> UserOperation {
    UserOperation::new(Address::repeat_byte(0x11), U256::from(5), hex!("deadbeef").to_vec())
        .with_gas_limits(100_000, 200_000, 50_000)
        .with_gas_prices(3_000_000_000, 1_000_000_000)
}

fn paymaster() -> PaymasterFields {
    PaymasterFields {
        paymaster: Address::repeat_byte(0x22),
        verification_gas_limit: U256::from(70_000),
        post_op_gas_limit: U256::from(5_000),
        data: Bytes::from_static(&[0xbe, 0xef]),
    }
}

// ============================================================================
// Hashing
// ============================================================================

#[test]
fn test_v07_hash_vector() {
    let hash = sample_op()
        .hash(EntryPointVersion::V07, ENTRY_POINT_V07, 8453u64)
        .unwrap();
    assert_eq!(
        hash,
        b256!("56fa499076188d799f30aab4e5b0f9a69985da5d5eb072c34fc4db3a9025e7cc")
    );
}

#[test]
fn test_v06_hash_vector() {
    let hash = sample_op()
        .hash(EntryPointVersion::V06, ENTRY_POINT_V06, 8453u64)
        .unwrap();
    assert_eq!(
        hash,
        b256!("9d64a78d0d50343cc3c32d5fd2aeec73357419175e9f33202e6cf15725ac2179")
    );
}

#[test]
fn test_hash_ignores_signature_but_binds_chain() {
    let op = sample_op();
    let signed = op.clone().with_signature(vec![1u8; 65]);
    let h = |op: &UserOperation, chain: u64| {
        op.hash(EntryPointVersion::V07, ENTRY_POINT_V07, chain).unwrap()
    };
    assert_eq!(h(&op, 1), h(&signed, 1));
    assert_ne!(h(&op, 1), h(&op, 10));
}

// ============================================================================
// Packing
// ============================================================================

#[test]
fn test_packed_gas_words() {
    let packed = sample_op().to_packed().unwrap();
    let (vgl, cgl) = unpack_u128_pair(packed.accountGasLimits);
    assert_eq!(vgl, U256::from(200_000));
    assert_eq!(cgl, U256::from(100_000));

    let (priority, max_fee) = unpack_u128_pair(packed.gasFees);
    assert_eq!(priority, U256::from(1_000_000_000u64));
    assert_eq!(max_fee, U256::from(3_000_000_000u64));
}

#[test]
fn test_gas_over_128_bits_is_rejected() {
    let mut op = sample_op();
    op.call_gas_limit = U256::from(1) << 128;
    assert!(matches!(
        op.to_packed(),
        Err(Error::ValueOverflow { bits: 128, .. })
    ));
}

#[test]
fn test_paymaster_layouts() {
    let op = sample_op().with_paymaster(paymaster());

    let v07 = op.paymaster_and_data(EntryPointVersion::V07).unwrap();
    assert_eq!(v07.len(), PAYMASTER_HEADER_LEN + 2);
    assert_eq!(&v07[..20], Address::repeat_byte(0x22).as_slice());
    assert_eq!(unpack_paymaster_and_data(&v07).unwrap(), Some(paymaster()));

    let v06 = op.paymaster_and_data(EntryPointVersion::V06).unwrap();
    assert_eq!(v06.len(), 20 + 2);
}

#[test]
fn test_short_paymaster_data_is_rejected() {
    let err = unpack_paymaster_and_data(&[0u8; 30]).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidLength {
            field: "paymasterAndData",
            actual: 30,
            ..
        }
    ));
}

#[test]
fn test_wire_round_trip_keeps_factory() {
    let op = sample_op()
        .with_factory(Address::repeat_byte(0x33), hex!("c0ffee").to_vec())
        .with_signature(vec![7u8; 77]);
    let encoded = op.encode(EntryPointVersion::V06).unwrap();
    assert_eq!(UserOperation::decode(EntryPointVersion::V06, &encoded).unwrap(), op);

    // v0.6 has no paymaster gas limits, so only v0.7 carries the full section
    let op = op.with_paymaster(paymaster());
    let encoded = op.encode(EntryPointVersion::V07).unwrap();
    assert_eq!(UserOperation::decode(EntryPointVersion::V07, &encoded).unwrap(), op);
}

#[test]
fn test_all_zero_paymaster_decodes_as_absent() {
    let op = sample_op().with_paymaster(PaymasterFields::default());
    for version in [EntryPointVersion::V07, EntryPointVersion::V06] {
        assert!(op.paymaster_and_data(version).unwrap().is_empty());
        let decoded = UserOperation::decode(version, &op.encode(version).unwrap()).unwrap();
        assert_eq!(decoded.paymaster, None, "{version}");
        assert_eq!(decoded, UserOperation { paymaster: None, ..op.clone() });
    }
}

// ============================================================================
// JSON-RPC
// ============================================================================

#[test]
fn test_rpc_format_v07() {
    let op = sample_op().with_paymaster(paymaster());
    let rpc = op.to_rpc_format(EntryPointVersion::V07).unwrap();

    assert_eq!(rpc["nonce"], "0x5");
    assert_eq!(rpc["callGasLimit"], "0x186a0");
    assert_eq!(rpc["callData"], "0xdeadbeef");
    assert_eq!(rpc["paymasterVerificationGasLimit"], "0x11170");
    assert_eq!(rpc["paymasterData"], "0xbeef");
    assert!(rpc.get("factory").is_none());
    assert!(rpc.get("initCode").is_none());
}

#[test]
fn test_rpc_format_v06() {
    let op = sample_op().with_factory(Address::repeat_byte(0x33), hex!("c0ffee").to_vec());
    let rpc = op.to_rpc_format(EntryPointVersion::V06).unwrap();

    let init_code = format!("0x{}c0ffee", "33".repeat(20));
    assert_eq!(rpc["initCode"], init_code);
    assert_eq!(rpc["paymasterAndData"], "0x");
    assert!(rpc.get("factory").is_none());
}

#[test]
fn test_nonce_key_split() {
    let key = U256::from(0xabcdu64);
    let op = sample_op().with_nonce((key << 64) | U256::from(9));
    assert_eq!(op.nonce_key(), key);
    assert_eq!(op.nonce_sequence(), 9);
    assert_ne!(op.nonce, U256::from(9));
}
