//! # ERC-4337 User Operations
//!
//! A single [`UserOperation`] model covers both entry point versions. It
//! converts to the flat v0.6 wire struct and the packed v0.7 wire struct,
//! computes the canonical operation hash, and renders the JSON-RPC shape a
//! bundler expects.
//!
//! ```rust,ignore
//! let op = UserOperation::new(sender, nonce, call_data)
//!     .with_gas_limits(150_000, 300_000, 50_000)
//!     .with_gas_prices(2_000_000_000, 1_000_000_000);
//!
//! let hash = op.hash(EntryPointVersion::V07, ENTRY_POINT_V07, 8453u64)?;
//! ```

pub mod packing;

use crate::config::EntryPointVersion;
use crate::types::{ChainId, keccak256};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolValue, sol};
use packing::{
    pack_account_gas_limits, pack_gas_fees, pack_init_code, pack_paymaster_and_data,
    pack_paymaster_and_data_v06, unpack_init_code, unpack_paymaster_and_data,
    unpack_paymaster_and_data_v06, unpack_u128_pair,
};
use serde::{Deserialize, Serialize};

sol! {
    #![sol(all_derives)]

    /// Entry point v0.7 wire layout
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    /// Entry point v0.6 wire layout
    struct UserOperationV06 {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }
}

// ============================================================================
// Optional sections
// ============================================================================

/// Factory deploying the account on first use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryFields {
    pub factory: Address,
    pub factory_data: Bytes,
}

/// Paymaster sponsoring the operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterFields {
    pub paymaster: Address,
    pub verification_gas_limit: U256,
    pub post_op_gas_limit: U256,
    pub data: Bytes,
}

impl PaymasterFields {
    /// An all-zero section, which serializes to `0x`
    pub fn is_empty(&self) -> bool {
        self.paymaster.is_zero()
            && self.verification_gas_limit.is_zero()
            && self.post_op_gas_limit.is_zero()
            && self.data.is_empty()
    }
}

// ============================================================================
// UserOperation
// ============================================================================

/// ERC-4337 user operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// Smart account address
    pub sender: Address,
    /// `key(192) || sequence(64)`
    pub nonce: U256,
    /// Present until the account is deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<FactoryFields>,
    /// Encoded call to execute
    pub call_data: Bytes,
    /// Gas for the execution phase
    pub call_gas_limit: U256,
    /// Gas for the validation phase
    pub verification_gas_limit: U256,
    /// Bundler overhead
    pub pre_verification_gas: U256,
    /// Maximum fee per gas
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: U256,
    /// Gas sponsorship
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<PaymasterFields>,
    /// Signature, empty until signed
    #[serde(default)]
    pub signature: Bytes,
}

impl UserOperation {
    /// Create a new UserOperation with placeholder gas values
    pub fn new(sender: Address, nonce: U256, call_data: impl Into<Bytes>) -> Self {
        Self {
            sender,
            nonce,
            factory: None,
            call_data: call_data.into(),
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(100_000),
            pre_verification_gas: U256::from(21_000),
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster: None,
            signature: Bytes::new(),
        }
    }

    /// Set factory fields for account deployment
    pub fn with_factory(mut self, factory: Address, factory_data: impl Into<Bytes>) -> Self {
        self.factory = Some(FactoryFields {
            factory,
            factory_data: factory_data.into(),
        });
        self
    }

    /// Set gas limits
    pub fn with_gas_limits(
        mut self,
        call_gas: u64,
        verification_gas: u64,
        pre_verification_gas: u64,
    ) -> Self {
        self.call_gas_limit = U256::from(call_gas);
        self.verification_gas_limit = U256::from(verification_gas);
        self.pre_verification_gas = U256::from(pre_verification_gas);
        self
    }

    /// Set gas prices
    pub fn with_gas_prices(mut self, max_fee: u128, max_priority_fee: u128) -> Self {
        self.max_fee_per_gas = U256::from(max_fee);
        self.max_priority_fee_per_gas = U256::from(max_priority_fee);
        self
    }

    /// Set paymaster
    pub fn with_paymaster(mut self, paymaster: PaymasterFields) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    /// Set nonce
    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set signature
    pub fn with_signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Whether this operation deploys the account
    pub fn is_deployment(&self) -> bool {
        self.factory.is_some()
    }

    /// Packed `initCode`
    pub fn init_code(&self) -> Bytes {
        pack_init_code(self.factory.as_ref())
    }

    /// `paymasterAndData` as laid out for `version`
    pub fn paymaster_and_data(&self, version: EntryPointVersion) -> Result<Bytes> {
        match version {
            EntryPointVersion::V06 => Ok(pack_paymaster_and_data_v06(self.paymaster.as_ref())),
            EntryPointVersion::V07 => pack_paymaster_and_data(self.paymaster.as_ref()),
        }
    }

    /// Sequence number within the nonce key
    pub fn nonce_sequence(&self) -> u64 {
        self.nonce.as_limbs()[0]
    }

    /// 192-bit nonce key
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> 64
    }

    // ============ Wire layouts ============

    /// Entry point v0.7 packed layout
    pub fn to_packed(&self) -> Result<PackedUserOperation> {
        Ok(PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: pack_account_gas_limits(
                self.verification_gas_limit,
                self.call_gas_limit,
            )?,
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_gas_fees(self.max_priority_fee_per_gas, self.max_fee_per_gas)?,
            paymasterAndData: pack_paymaster_and_data(self.paymaster.as_ref())?,
            signature: self.signature.clone(),
        })
    }

    /// Build from the v0.7 packed layout
    pub fn from_packed(packed: &PackedUserOperation) -> Result<Self> {
        let (verification_gas_limit, call_gas_limit) = unpack_u128_pair(packed.accountGasLimits);
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_u128_pair(packed.gasFees);
        Ok(Self {
            sender: packed.sender,
            nonce: packed.nonce,
            factory: unpack_init_code(&packed.initCode)?,
            call_data: packed.callData.clone(),
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas: packed.preVerificationGas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster: unpack_paymaster_and_data(&packed.paymasterAndData)?,
            signature: packed.signature.clone(),
        })
    }

    /// Entry point v0.6 flat layout
    pub fn to_v06(&self) -> UserOperationV06 {
        UserOperationV06 {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            callGasLimit: self.call_gas_limit,
            verificationGasLimit: self.verification_gas_limit,
            preVerificationGas: self.pre_verification_gas,
            maxFeePerGas: self.max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas,
            paymasterAndData: pack_paymaster_and_data_v06(self.paymaster.as_ref()),
            signature: self.signature.clone(),
        }
    }

    /// Build from the v0.6 flat layout
    pub fn from_v06(op: &UserOperationV06) -> Result<Self> {
        Ok(Self {
            sender: op.sender,
            nonce: op.nonce,
            factory: unpack_init_code(&op.initCode)?,
            call_data: op.callData.clone(),
            call_gas_limit: op.callGasLimit,
            verification_gas_limit: op.verificationGasLimit,
            pre_verification_gas: op.preVerificationGas,
            max_fee_per_gas: op.maxFeePerGas,
            max_priority_fee_per_gas: op.maxPriorityFeePerGas,
            paymaster: unpack_paymaster_and_data_v06(&op.paymasterAndData)?,
            signature: op.signature.clone(),
        })
    }

    /// ABI-encode in the wire layout of `version`
    pub fn encode(&self, version: EntryPointVersion) -> Result<Bytes> {
        Ok(match version {
            EntryPointVersion::V06 => self.to_v06().abi_encode(),
            EntryPointVersion::V07 => self.to_packed()?.abi_encode(),
        }
        .into())
    }

    /// Decode from the wire layout of `version`
    pub fn decode(version: EntryPointVersion, data: &[u8]) -> Result<Self> {
        match version {
            EntryPointVersion::V06 => Self::from_v06(
                &UserOperationV06::abi_decode(data, true)
                    .map_err(|e| Error::abi("UserOperation", e))?,
            ),
            EntryPointVersion::V07 => Self::from_packed(
                &PackedUserOperation::abi_decode(data, true)
                    .map_err(|e| Error::abi("PackedUserOperation", e))?,
            ),
        }
    }

    // ============ Hashing ============

    /// Hash of the operation's own fields, excluding the signature
    pub fn inner_hash(&self, version: EntryPointVersion) -> Result<B256> {
        let init_code_hash = keccak256(self.init_code());
        let call_data_hash = keccak256(&self.call_data);
        let encoded = match version {
            EntryPointVersion::V06 => {
                let paymaster_hash = keccak256(pack_paymaster_and_data_v06(self.paymaster.as_ref()));
                (
                    self.sender,
                    self.nonce,
                    init_code_hash,
                    call_data_hash,
                    self.call_gas_limit,
                    self.verification_gas_limit,
                    self.pre_verification_gas,
                    self.max_fee_per_gas,
                    self.max_priority_fee_per_gas,
                    paymaster_hash,
                )
                    .abi_encode_params()
            }
            EntryPointVersion::V07 => {
                let packed = self.to_packed()?;
                (
                    packed.sender,
                    packed.nonce,
                    init_code_hash,
                    call_data_hash,
                    packed.accountGasLimits,
                    packed.preVerificationGas,
                    packed.gasFees,
                    keccak256(&packed.paymasterAndData),
                )
                    .abi_encode_params()
            }
        };
        Ok(keccak256(encoded))
    }

    /// Canonical operation hash:
    /// `keccak256(abi.encode(innerHash, entryPoint, chainId))`
    pub fn hash(
        &self,
        version: EntryPointVersion,
        entry_point: Address,
        chain_id: impl Into<ChainId>,
    ) -> Result<B256> {
        let inner = self.inner_hash(version)?;
        let chain_id = U256::from(chain_id.into().0);
        Ok(keccak256((inner, entry_point, chain_id).abi_encode_params()))
    }

    // ============ JSON-RPC ============

    /// Convert to the bundler JSON-RPC format for `version`
    pub fn to_rpc_format(&self, version: EntryPointVersion) -> Result<serde_json::Value> {
        let quantity = |v: &U256| format!("{v:#x}");
        let mut value = serde_json::json!({
            "sender": self.sender.to_checksum(None),
            "nonce": quantity(&self.nonce),
            "callData": self.call_data.to_string(),
            "callGasLimit": quantity(&self.call_gas_limit),
            "verificationGasLimit": quantity(&self.verification_gas_limit),
            "preVerificationGas": quantity(&self.pre_verification_gas),
            "maxFeePerGas": quantity(&self.max_fee_per_gas),
            "maxPriorityFeePerGas": quantity(&self.max_priority_fee_per_gas),
            "signature": self.signature.to_string(),
        });
        let Some(obj) = value.as_object_mut() else {
            return Err(Error::Serialization("user operation is not an object".into()));
        };
        match version {
            EntryPointVersion::V06 => {
                obj.insert("initCode".into(), self.init_code().to_string().into());
                obj.insert(
                    "paymasterAndData".into(),
                    pack_paymaster_and_data_v06(self.paymaster.as_ref()).to_string().into(),
                );
            }
            EntryPointVersion::V07 => {
                if let Some(f) = &self.factory {
                    obj.insert("factory".into(), f.factory.to_checksum(None).into());
                    obj.insert("factoryData".into(), f.factory_data.to_string().into());
                }
                if let Some(pm) = self.paymaster.as_ref().filter(|pm| !pm.is_empty()) {
                    obj.insert("paymaster".into(), pm.paymaster.to_checksum(None).into());
                    obj.insert(
                        "paymasterVerificationGasLimit".into(),
                        quantity(&pm.verification_gas_limit).into(),
                    );
                    obj.insert(
                        "paymasterPostOpGasLimit".into(),
                        quantity(&pm.post_op_gas_limit).into(),
                    );
                    obj.insert("paymasterData".into(), pm.data.to_string().into());
                }
            }
        }
        Ok(value)
    }

    /// Attach a real signature, producing an operation that may be broadcast
    pub fn into_signed(self, signature: impl Into<Bytes>) -> SignedUserOperation {
        SignedUserOperation(self.with_signature(signature))
    }
}

/// A user operation carrying a real signature
///
/// Only signers produce these; operations carrying stub signatures stay
/// plain [`UserOperation`]s and cannot reach `eth_sendUserOperation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUserOperation(UserOperation);

impl SignedUserOperation {
    pub fn operation(&self) -> &UserOperation {
        &self.0
    }

    pub fn signature(&self) -> &Bytes {
        &self.0.signature
    }

    pub fn into_inner(self) -> UserOperation {
        self.0
    }
}

impl std::ops::Deref for SignedUserOperation {
    type Target = UserOperation;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
