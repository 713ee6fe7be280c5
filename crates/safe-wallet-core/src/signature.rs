//! Safe EIP-712 structures and signature encoding
//!
//! - `SafeOp`: what owners sign for a user operation, with a validity window.
//!   The struct differs between Safe4337Module 0.2.0 (entry point v0.6) and
//!   0.3.0 (entry point v0.7).
//! - `SafeMessage`: what owners sign for an ERC-1271 message.
//! - Signature aggregation into the byte layout `checkSignatures` walks.

use crate::config::{EntryPointVersion, SafeAccountConfig};
use crate::types::{ChainId, Signature};
use crate::user_op::UserOperation;
use crate::user_op::packing::check_u128;
use crate::{Error, Result};
use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use serde::{Deserialize, Serialize};

pub mod v06 {
    use super::*;

    sol! {
        #![sol(all_derives)]

        /// Safe4337Module 0.2.0 operation
        struct SafeOp {
            address safe;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint256 callGasLimit;
            uint256 verificationGasLimit;
            uint256 preVerificationGas;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            bytes paymasterAndData;
            uint48 validAfter;
            uint48 validUntil;
            address entryPoint;
        }
    }
}

pub mod v07 {
    use super::*;

    sol! {
        #![sol(all_derives)]

        /// Safe4337Module 0.3.0 operation
        struct SafeOp {
            address safe;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint128 verificationGasLimit;
            uint128 callGasLimit;
            uint256 preVerificationGas;
            uint128 maxPriorityFeePerGas;
            uint128 maxFeePerGas;
            bytes paymasterAndData;
            uint48 validAfter;
            uint48 validUntil;
            address entryPoint;
        }
    }
}

sol! {
    #![sol(all_derives)]

    /// ERC-1271 message wrapper
    struct SafeMessage {
        bytes message;
    }
}

const MAX_U48: u64 = (1 << 48) - 1;

// ============================================================================
// Validity window
// ============================================================================

/// `validAfter` / `validUntil` pair prefixed to user-operation signatures.
/// `(0, 0)` means always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    pub valid_after: u64,
    pub valid_until: u64,
}

impl ValidityWindow {
    /// Encoded length
    pub const LEN: usize = 12;

    pub fn new(valid_after: u64, valid_until: u64) -> Result<Self> {
        let window = Self {
            valid_after,
            valid_until,
        };
        window.check()?;
        Ok(window)
    }

    /// Always valid
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.valid_after > MAX_U48 {
            return Err(Error::ValueOverflow {
                field: "validAfter",
                bits: 48,
            });
        }
        if self.valid_until > MAX_U48 {
            return Err(Error::ValueOverflow {
                field: "validUntil",
                bits: 48,
            });
        }
        Ok(())
    }

    /// `validAfter(6) || validUntil(6)`
    pub fn encode(&self) -> Result<[u8; 12]> {
        self.check()?;
        let mut out = [0u8; 12];
        out[..6].copy_from_slice(&self.valid_after.to_be_bytes()[2..]);
        out[6..].copy_from_slice(&self.valid_until.to_be_bytes()[2..]);
        Ok(out)
    }

    /// Split a user-operation signature into its window and owner signatures
    pub fn split(signature: &[u8]) -> Result<(Self, &[u8])> {
        if signature.len() < Self::LEN {
            return Err(Error::InvalidLength {
                field: "signature",
                expected: Self::LEN,
                actual: signature.len(),
            });
        }
        let mut after = [0u8; 8];
        let mut until = [0u8; 8];
        after[2..].copy_from_slice(&signature[..6]);
        until[2..].copy_from_slice(&signature[6..12]);
        Ok((
            Self {
                valid_after: u64::from_be_bytes(after),
                valid_until: u64::from_be_bytes(until),
            },
            &signature[12..],
        ))
    }

    fn bounds(&self) -> Result<(U48, U48)> {
        self.check()?;
        Ok((
            U48::from_limbs([self.valid_after]),
            U48::from_limbs([self.valid_until]),
        ))
    }
}

/// Prefix owner signatures with the validity window
pub fn encode_user_op_signature(window: ValidityWindow, signatures: &[u8]) -> Result<Bytes> {
    let mut out = Vec::with_capacity(ValidityWindow::LEN + signatures.len());
    out.extend_from_slice(&window.encode()?);
    out.extend_from_slice(signatures);
    Ok(out.into())
}

// ============================================================================
// SafeOp
// ============================================================================

/// EIP-712 domain `{chainId, verifyingContract}`
pub fn safe_domain(chain_id: ChainId, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain {
        chain_id: Some(U256::from(chain_id.0)),
        verifying_contract: Some(verifying_contract),
        ..Default::default()
    }
}

/// `SafeOp` for the module version paired with `version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeOp {
    V06(v06::SafeOp),
    V07(v07::SafeOp),
}

impl SafeOp {
    /// Bind `op` to the entry point and validity window
    pub fn new(
        version: EntryPointVersion,
        op: &UserOperation,
        entry_point: Address,
        window: ValidityWindow,
    ) -> Result<Self> {
        let (valid_after, valid_until) = window.bounds()?;
        Ok(match version {
            EntryPointVersion::V06 => SafeOp::V06(v06::SafeOp {
                safe: op.sender,
                nonce: op.nonce,
                initCode: op.init_code(),
                callData: op.call_data.clone(),
                callGasLimit: op.call_gas_limit,
                verificationGasLimit: op.verification_gas_limit,
                preVerificationGas: op.pre_verification_gas,
                maxFeePerGas: op.max_fee_per_gas,
                maxPriorityFeePerGas: op.max_priority_fee_per_gas,
                paymasterAndData: op.paymaster_and_data(version)?,
                validAfter: valid_after,
                validUntil: valid_until,
                entryPoint: entry_point,
            }),
            EntryPointVersion::V07 => SafeOp::V07(v07::SafeOp {
                safe: op.sender,
                nonce: op.nonce,
                initCode: op.init_code(),
                callData: op.call_data.clone(),
                verificationGasLimit: check_u128(
                    "verificationGasLimit",
                    op.verification_gas_limit,
                )?,
                callGasLimit: check_u128("callGasLimit", op.call_gas_limit)?,
                preVerificationGas: op.pre_verification_gas,
                maxPriorityFeePerGas: check_u128(
                    "maxPriorityFeePerGas",
                    op.max_priority_fee_per_gas,
                )?,
                maxFeePerGas: check_u128("maxFeePerGas", op.max_fee_per_gas)?,
                paymasterAndData: op.paymaster_and_data(version)?,
                validAfter: valid_after,
                validUntil: valid_until,
                entryPoint: entry_point,
            }),
        })
    }

    /// Build from the addresses in `config`
    pub fn from_config(
        config: &SafeAccountConfig,
        op: &UserOperation,
        window: ValidityWindow,
    ) -> Result<Self> {
        Self::new(config.entry_point_version, op, config.entry_point, window)
    }

    /// `hashStruct(SafeOp)`
    pub fn struct_hash(&self) -> B256 {
        match self {
            SafeOp::V06(op) => op.eip712_hash_struct(),
            SafeOp::V07(op) => op.eip712_hash_struct(),
        }
    }

    /// Digest signed by owners
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        match self {
            SafeOp::V06(op) => op.eip712_signing_hash(domain),
            SafeOp::V07(op) => op.eip712_signing_hash(domain),
        }
    }
}

/// Digest owners sign for `op` under `config`
pub fn safe_op_hash(
    config: &SafeAccountConfig,
    op: &UserOperation,
    window: ValidityWindow,
) -> Result<B256> {
    let domain = safe_domain(config.chain_id()?, config.validation_module());
    Ok(SafeOp::from_config(config, op, window)?.signing_hash(&domain))
}

// ============================================================================
// SafeMessage
// ============================================================================

/// Digest a Safe owner signs so the Safe accepts `message_hash` via ERC-1271
pub fn safe_message_hash(safe: Address, chain_id: ChainId, message_hash: B256) -> B256 {
    let message = SafeMessage {
        message: Bytes::copy_from_slice(message_hash.as_slice()),
    };
    message.eip712_signing_hash(&safe_domain(chain_id, safe))
}

// ============================================================================
// Aggregation
// ============================================================================

/// One owner's contribution to a Safe signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeSignature {
    /// 65-byte ECDSA signature from an EOA owner
    Ecdsa { signer: Address, signature: Signature },
    /// ERC-1271 signature from a contract owner
    Contract { signer: Address, data: Bytes },
}

impl SafeSignature {
    pub fn signer(&self) -> Address {
        match self {
            SafeSignature::Ecdsa { signer, .. } | SafeSignature::Contract { signer, .. } => *signer,
        }
    }
}

/// Concatenate owner signatures in ascending signer order
///
/// Static parts are 65 bytes each. Contract signatures use
/// `r = signer, s = offset, v = 0` and append `length || data` after the
/// static region.
pub fn build_signature_bytes(signatures: &[SafeSignature]) -> Bytes {
    let mut sorted: Vec<&SafeSignature> = signatures.iter().collect();
    sorted.sort_by_key(|s| s.signer());

    let static_len = 65 * sorted.len();
    let mut static_part = Vec::with_capacity(static_len);
    let mut dynamic_part = Vec::new();

    for sig in sorted {
        match sig {
            SafeSignature::Ecdsa { signature, .. } => {
                static_part.extend_from_slice(&signature.to_rsv_bytes());
            }
            SafeSignature::Contract { signer, data } => {
                let offset = static_len + dynamic_part.len();
                static_part.extend_from_slice(signer.into_word().as_slice());
                static_part.extend_from_slice(&U256::from(offset).to_be_bytes::<32>());
                static_part.push(0);
                dynamic_part.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
                dynamic_part.extend_from_slice(data);
            }
        }
    }

    static_part.extend_from_slice(&dynamic_part);
    static_part.into()
}
