//! Field packing shared by the entry point wire layouts

use super::{FactoryFields, PaymasterFields};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};

/// `address(20) || verificationGasLimit(16) || postOpGasLimit(16)`
pub const PAYMASTER_HEADER_LEN: usize = 20 + 16 + 16;

/// Ensure `value` fits in 128 bits
pub fn check_u128(field: &'static str, value: U256) -> Result<u128> {
    u128::try_from(value).map_err(|_| Error::ValueOverflow { field, bits: 128 })
}

/// Pack two 128-bit values into one word, `high` first
pub fn pack_u128_pair(
    high: (&'static str, U256),
    low: (&'static str, U256),
) -> Result<B256> {
    let high = check_u128(high.0, high.1)?;
    let low = check_u128(low.0, low.1)?;
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    Ok(B256::from(word))
}

/// Split a word into its high and low 128-bit halves
pub fn unpack_u128_pair(word: B256) -> (U256, U256) {
    (
        U256::from_be_slice(&word[..16]),
        U256::from_be_slice(&word[16..]),
    )
}

/// `accountGasLimits = verificationGasLimit(16) || callGasLimit(16)`
pub fn pack_account_gas_limits(verification_gas_limit: U256, call_gas_limit: U256) -> Result<B256> {
    pack_u128_pair(
        ("verificationGasLimit", verification_gas_limit),
        ("callGasLimit", call_gas_limit),
    )
}

/// `gasFees = maxPriorityFeePerGas(16) || maxFeePerGas(16)`
pub fn pack_gas_fees(max_priority_fee_per_gas: U256, max_fee_per_gas: U256) -> Result<B256> {
    pack_u128_pair(
        ("maxPriorityFeePerGas", max_priority_fee_per_gas),
        ("maxFeePerGas", max_fee_per_gas),
    )
}

/// `initCode = factory || factoryData`, empty without a factory
pub fn pack_init_code(factory: Option<&FactoryFields>) -> Bytes {
    match factory {
        Some(f) => {
            let mut out = Vec::with_capacity(20 + f.factory_data.len());
            out.extend_from_slice(f.factory.as_slice());
            out.extend_from_slice(&f.factory_data);
            out.into()
        }
        None => Bytes::new(),
    }
}

/// Inverse of [`pack_init_code`]
pub fn unpack_init_code(init_code: &[u8]) -> Result<Option<FactoryFields>> {
    match init_code.len() {
        0 => Ok(None),
        len if len < 20 => Err(Error::InvalidLength {
            field: "initCode",
            expected: 20,
            actual: len,
        }),
        _ => Ok(Some(FactoryFields {
            factory: Address::from_slice(&init_code[..20]),
            factory_data: Bytes::copy_from_slice(&init_code[20..]),
        })),
    }
}

/// v0.7 `paymasterAndData`; an absent or all-zero paymaster packs to `0x`
pub fn pack_paymaster_and_data(paymaster: Option<&PaymasterFields>) -> Result<Bytes> {
    let Some(pm) = paymaster.filter(|pm| !pm.is_empty()) else {
        return Ok(Bytes::new());
    };
    let verification = check_u128("paymasterVerificationGasLimit", pm.verification_gas_limit)?;
    let post_op = check_u128("paymasterPostOpGasLimit", pm.post_op_gas_limit)?;
    let mut out = Vec::with_capacity(PAYMASTER_HEADER_LEN + pm.data.len());
    out.extend_from_slice(pm.paymaster.as_slice());
    out.extend_from_slice(&verification.to_be_bytes());
    out.extend_from_slice(&post_op.to_be_bytes());
    out.extend_from_slice(&pm.data);
    Ok(out.into())
}

/// Inverse of [`pack_paymaster_and_data`]
pub fn unpack_paymaster_and_data(data: &[u8]) -> Result<Option<PaymasterFields>> {
    match data.len() {
        0 => Ok(None),
        len if len < PAYMASTER_HEADER_LEN => Err(Error::InvalidLength {
            field: "paymasterAndData",
            expected: PAYMASTER_HEADER_LEN,
            actual: len,
        }),
        _ => Ok(Some(PaymasterFields {
            paymaster: Address::from_slice(&data[..20]),
            verification_gas_limit: U256::from_be_slice(&data[20..36]),
            post_op_gas_limit: U256::from_be_slice(&data[36..52]),
            data: Bytes::copy_from_slice(&data[52..]),
        })),
    }
}

/// v0.6 `paymasterAndData = paymaster || data`
pub fn pack_paymaster_and_data_v06(paymaster: Option<&PaymasterFields>) -> Bytes {
    match paymaster.filter(|pm| !pm.is_empty()) {
        Some(pm) => {
            let mut out = Vec::with_capacity(20 + pm.data.len());
            out.extend_from_slice(pm.paymaster.as_slice());
            out.extend_from_slice(&pm.data);
            out.into()
        }
        None => Bytes::new(),
    }
}

/// Inverse of [`pack_paymaster_and_data_v06`]
pub fn unpack_paymaster_and_data_v06(data: &[u8]) -> Result<Option<PaymasterFields>> {
    match data.len() {
        0 => Ok(None),
        len if len < 20 => Err(Error::InvalidLength {
            field: "paymasterAndData",
            expected: 20,
            actual: len,
        }),
        _ => Ok(Some(PaymasterFields {
            paymaster: Address::from_slice(&data[..20]),
            verification_gas_limit: U256::ZERO,
            post_op_gas_limit: U256::ZERO,
            data: Bytes::copy_from_slice(&data[20..]),
        })),
    }
}
