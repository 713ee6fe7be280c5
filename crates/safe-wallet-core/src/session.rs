//! # Smart Sessions
//!
//! Delegated, policy-scoped signing installed as an ERC-7579 validator.
//!
//! A [`Session`] names the validator that checks the session key's
//! signature, the policies gating every user operation, and the actions
//! the key may perform. Once enabled on an account, the session key signs
//! user operations whose nonce key routes validation to the smart-sessions
//! module, and whose signature is wrapped in a mode-tagged envelope.

use crate::config::SafeAccountConfig;
use crate::contracts::{
    ActionData, ERC7739Data, IERC7579Account, ISmartSessions, PolicyData, Session, module_type,
};
use crate::types::{Call, keccak256};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, address};
use alloy_sol_types::{SolCall, SolStruct, SolValue};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Action target matching any contract
pub const FALLBACK_TARGET: Address = address!("0000000000000000000000000000000000000001");

/// Action selector matching any function
pub const FALLBACK_SELECTOR: FixedBytes<4> = FixedBytes([0x00, 0x00, 0x00, 0x01]);

/// Default session lifetime
pub const DEFAULT_SESSION_DAYS: i64 = 365;

// ============================================================================
// Modes and account types
// ============================================================================

/// First byte of a smart-session signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionMode {
    /// Session already enabled on-chain
    Use = 0x00,
    /// Enable and use in the same operation
    Enable = 0x01,
    /// Enable without registry checks
    UnsafeEnable = 0x02,
}

impl SessionMode {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(SessionMode::Use),
            0x01 => Ok(SessionMode::Enable),
            0x02 => Ok(SessionMode::UnsafeEnable),
            other => Err(Error::abi("mode", format!("unknown session mode {other:#04x}"))),
        }
    }
}

/// Account implementation, which decides the nonce key layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Safe,
    Kernel,
    Nexus,
}

// ============================================================================
// Session construction
// ============================================================================

/// Contract call a session may perform, with its policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPolicy {
    pub target: Address,
    pub selector: FixedBytes<4>,
    #[serde(default)]
    pub policies: Vec<PolicyData>,
}

/// Caller input to [`build_session`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Keys allowed to sign for the session
    pub session_keys: Vec<Address>,
    /// Validator checking the session key; the ownable validator when unset
    #[serde(default)]
    pub validator: Option<Address>,
    /// Init data for a custom validator
    #[serde(default)]
    pub validator_init_data: Option<Bytes>,
    /// Random when unset
    #[serde(default)]
    pub salt: Option<B256>,
    #[serde(default)]
    pub valid_after: u64,
    /// One year from now when unset
    #[serde(default)]
    pub valid_until: Option<u64>,
    /// Sudo on any target when empty
    #[serde(default)]
    pub actions: Vec<ActionPolicy>,
    #[serde(default)]
    pub permit_paymaster: bool,
}

impl SessionParams {
    /// Session for a single key with every default applied
    pub fn for_key(session_key: Address) -> Self {
        Self {
            session_keys: vec![session_key],
            permit_paymaster: true,
            ..Default::default()
        }
    }

    pub fn with_salt(mut self, salt: B256) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn with_validity(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.valid_after = valid_after;
        self.valid_until = Some(valid_until);
        self
    }

    pub fn with_action(mut self, action: ActionPolicy) -> Self {
        self.actions.push(action);
        self
    }
}

/// `abi.encode(uint256 threshold, address[] owners)` with owners ascending
pub fn ownable_validator_init_data(threshold: u64, owners: &[Address]) -> Result<Bytes> {
    let mut owners = owners.to_vec();
    owners.sort();
    owners.dedup();
    if owners.is_empty() {
        return Err(Error::MissingOwner);
    }
    if threshold == 0 || threshold as usize > owners.len() {
        return Err(Error::InvalidThreshold {
            threshold,
            owners: owners.len(),
        });
    }
    Ok((U256::from(threshold), owners).abi_encode_params().into())
}

/// `encodePacked(uint128 validUntil, uint128 validAfter)`
pub fn time_frame_init_data(valid_after: u64, valid_until: u64) -> Bytes {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(&u128::from(valid_until).to_be_bytes());
    out.extend_from_slice(&u128::from(valid_after).to_be_bytes());
    out.into()
}

/// Sudo action on the fallback target
pub fn sudo_action(sudo_policy: Address) -> ActionData {
    ActionData {
        actionTargetSelector: FALLBACK_SELECTOR,
        actionTarget: FALLBACK_TARGET,
        actionPolicies: vec![PolicyData {
            policy: sudo_policy,
            initData: Bytes::new(),
        }],
    }
}

/// Apply defaults to `params` and produce the on-chain session struct
pub fn build_session(config: &SafeAccountConfig, params: &SessionParams) -> Result<Session> {
    let (validator, init_data) = match (params.validator, &params.validator_init_data) {
        (Some(validator), Some(data)) => (validator, data.clone()),
        (Some(validator), None) if validator != config.ownable_validator => {
            return Err(Error::InvalidConfig(
                "custom session validator requires init data".into(),
            ));
        }
        _ => (
            config.ownable_validator,
            ownable_validator_init_data(1, &params.session_keys)?,
        ),
    };

    let valid_until = match params.valid_until {
        Some(until) => until,
        None => {
            let expiry = Utc::now() + Duration::days(DEFAULT_SESSION_DAYS);
            u64::try_from(expiry.timestamp()).map_err(|_| Error::ValueOverflow {
                field: "validUntil",
                bits: 64,
            })?
        }
    };
    if valid_until != 0 && valid_until <= params.valid_after {
        return Err(Error::InvalidConfig(format!(
            "session validUntil {valid_until} is not after validAfter {}",
            params.valid_after
        )));
    }

    let salt = params
        .salt
        .unwrap_or_else(|| B256::from(rand::random::<[u8; 32]>()));

    let actions = if params.actions.is_empty() {
        vec![sudo_action(config.sudo_policy)]
    } else {
        params
            .actions
            .iter()
            .map(|action| ActionData {
                actionTargetSelector: action.selector,
                actionTarget: action.target,
                actionPolicies: if action.policies.is_empty() {
                    sudo_action(config.sudo_policy).actionPolicies
                } else {
                    action.policies.clone()
                },
            })
            .collect()
    };

    let session = Session {
        sessionValidator: validator,
        sessionValidatorInitData: init_data,
        salt,
        userOpPolicies: vec![PolicyData {
            policy: config.time_frame_policy,
            initData: time_frame_init_data(params.valid_after, valid_until),
        }],
        erc7739Policies: ERC7739Data::default(),
        actions,
        permit4337Paymaster: params.permit_paymaster,
    };
    debug!(
        validator = %session.sessionValidator,
        actions = session.actions.len(),
        valid_until,
        "built session"
    );
    Ok(session)
}

// ============================================================================
// Identifiers
// ============================================================================

/// `keccak256(abi.encode(sessionValidator, sessionValidatorInitData, salt))`
pub fn derive_permission_id(session: &Session) -> B256 {
    keccak256(
        (
            session.sessionValidator,
            session.sessionValidatorInitData.clone(),
            session.salt,
        )
            .abi_encode_params(),
    )
}

/// EIP-712 struct hash over the whole session.
///
/// Sensitive to the order of `actions` and policies.
pub fn session_digest(session: &Session) -> B256 {
    session.eip712_hash_struct()
}

/// 192-bit nonce key routing validation to `validator`
///
/// - Safe / Nexus: `validator(20) || 0x00000000`
/// - Kernel v3: `mode(1)=0x00 || type(1)=0x01 || validator(20) || 0x0000`
pub fn derive_nonce_key(account_type: AccountType, validator: Address) -> U256 {
    let mut key = [0u8; 24];
    match account_type {
        AccountType::Safe | AccountType::Nexus => {
            key[..20].copy_from_slice(validator.as_slice());
        }
        AccountType::Kernel => {
            key[1] = 0x01;
            key[2..22].copy_from_slice(validator.as_slice());
        }
    }
    U256::from_be_slice(&key)
}

/// `key(192) || sequence(64)`
pub fn nonce_with_key(key: U256, sequence: u64) -> U256 {
    (key << 64) | U256::from(sequence)
}

// ============================================================================
// Signature envelope
// ============================================================================

/// `0x00 || permissionId(32) || signature`
pub fn encode_use_signature(permission_id: B256, signature: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(33 + signature.len());
    out.push(SessionMode::Use as u8);
    out.extend_from_slice(permission_id.as_slice());
    out.extend_from_slice(signature);
    out.into()
}

/// Split a `USE` envelope into its permission id and inner signature
pub fn decode_use_signature(data: &[u8]) -> Result<(B256, &[u8])> {
    if data.len() < 33 {
        return Err(Error::InvalidLength {
            field: "session signature",
            expected: 33,
            actual: data.len(),
        });
    }
    match SessionMode::from_byte(data[0])? {
        SessionMode::Use => Ok((B256::from_slice(&data[1..33]), &data[33..])),
        _ => Err(Error::NotSupported("enable-mode session signatures")),
    }
}

// ============================================================================
// Calldata
// ============================================================================

/// Install the smart-sessions module as a validator
pub fn install_smart_sessions_call(config: &SafeAccountConfig, account: Address) -> Call {
    let data = IERC7579Account::installModuleCall {
        moduleTypeId: U256::from(module_type::VALIDATOR),
        module: config.smart_sessions,
        initData: Bytes::new(),
    }
    .abi_encode();
    Call::new(account, U256::ZERO, data)
}

/// `enableSessions(sessions)` on the smart-sessions module
pub fn enable_sessions_call(config: &SafeAccountConfig, sessions: Vec<Session>) -> Call {
    let data = ISmartSessions::enableSessionsCall { sessions }.abi_encode();
    Call::new(config.smart_sessions, U256::ZERO, data)
}

/// `removeSession(permissionId)` on the smart-sessions module
pub fn remove_session_call(config: &SafeAccountConfig, permission_id: B256) -> Call {
    let data = ISmartSessions::removeSessionCall {
        permissionId: permission_id,
    }
    .abi_encode();
    Call::new(config.smart_sessions, U256::ZERO, data)
}

/// Calls granting `session` on `account`, installing the module first when needed
pub fn grant_calls(
    config: &SafeAccountConfig,
    account: Address,
    session: Session,
    module_installed: bool,
) -> Vec<Call> {
    let mut calls = Vec::with_capacity(2);
    if !module_installed {
        calls.push(install_smart_sessions_call(config, account));
    }
    calls.push(enable_sessions_call(config, vec![session]));
    calls
}

/// Calldata for `isPermissionEnabled(permissionId, account)`
pub fn encode_is_permission_enabled(permission_id: B256, account: Address) -> Bytes {
    ISmartSessions::isPermissionEnabledCall {
        permissionId: permission_id,
        account,
    }
    .abi_encode()
    .into()
}

/// Decode the boolean returned by `isPermissionEnabled`
pub fn decode_is_permission_enabled(data: &[u8]) -> Result<bool> {
    Ok(ISmartSessions::isPermissionEnabledCall::abi_decode_returns(data, true)
        .map_err(|e| Error::abi("isPermissionEnabled", e))?
        ._0)
}
