//! Protocol configuration
//!
//! Every contract address the builders need lives in [`SafeAccountConfig`],
//! which is passed explicitly into each component. Two presets cover the
//! supported entry points.

use crate::types::ChainId;
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, address, bytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// ERC-4337 EntryPoint v0.6 address (same on most chains)
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// ERC-4337 EntryPoint v0.7 address
pub const ENTRY_POINT_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Safe L2 singleton v1.4.1
pub const SAFE_L2_SINGLETON: Address = address!("29fcB43b46531BcA003ddC8FCB67FFE91900C762");

/// SafeProxyFactory v1.4.1
pub const SAFE_PROXY_FACTORY: Address = address!("4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67");

/// MultiSend v1.4.1
pub const MULTI_SEND: Address = address!("38869bf66a61cF6bDB996A6aE40D5853Fd43B526");

/// MultiSendCallOnly v1.4.1
pub const MULTI_SEND_CALL_ONLY: Address = address!("9641d764fc13c8B624c04430C7356C1C7C8102e2");

/// Safe4337Module 0.2.0 (entry point v0.6)
pub const SAFE_4337_MODULE_V06: Address = address!("a581c4A4DB7175302464fF3C06380BC3270b4037");

/// AddModulesLib paired with Safe4337Module 0.2.0
pub const ADD_MODULES_LIB_V06: Address = address!("8EcD4ec46D4D2a6B64fE960B3D64e8B94B2234eb");

/// Safe4337Module 0.3.0 (entry point v0.7)
pub const SAFE_4337_MODULE_V07: Address = address!("75cf11467937ce3F2f357CE24ffc3DBF8fD5c226");

/// SafeModuleSetup paired with Safe4337Module 0.3.0
pub const SAFE_MODULE_SETUP_V07: Address = address!("2dd68b007B46fBe91B9A7c3EDa5A7a1063cB5b47");

/// Safe WebAuthn shared signer
pub const WEBAUTHN_SHARED_SIGNER: Address = address!("94a4F6affBd8975951142c3999aEAB7ecee555c2");

/// FreshCryptoLib P-256 verifier used by the shared signer
pub const FCL_P256_VERIFIER: Address = address!("445a0683e494ea0c5AF3E83c5159fBE47Cf9e765");

/// Safe7579 adapter
pub const SAFE_7579_ADAPTER: Address = address!("7579EE8307284F293B1927136486880611F20002");

/// ERC-7484 module registry
pub const MODULE_REGISTRY: Address = address!("000000000069E2a187AEFFb852bF3cCdC95151B2");

/// Rhinestone attester
pub const RHINESTONE_ATTESTER: Address = address!("000000333034E9f539ce08819E12c1b8Cb29084d");

/// Mock attester used on test networks
pub const MOCK_ATTESTER: Address = address!("A4C777199658a41688E9488c4EcbD7a2925Cc23A");

/// Smart-sessions validator module
pub const SMART_SESSIONS: Address = address!("00000000002B0eCfbD0496EE71e01257dA0E37DE");

/// Ownable validator, the default session validator
pub const OWNABLE_VALIDATOR: Address = address!("2483DA3A338895199E5e538530213157e931Bf06");

/// Sudo policy (allows everything)
pub const SUDO_POLICY: Address = address!("0000003111cD8e92337C100F22B7A9dbf8DEE301");

/// Time-frame policy (validUntil / validAfter)
pub const TIME_FRAME_POLICY: Address = address!("8177451511dE0577b911C254E9551D981C26dc72");

/// Default authenticator timeout
pub const DEFAULT_PASSKEY_TIMEOUT: Duration = Duration::from_secs(60);

/// Creation code of the Safe 1.4.1 proxy, as returned by
/// `SafeProxyFactory.proxyCreationCode()`
pub const SAFE_PROXY_CREATION_CODE: Bytes = bytes!(
    "608060405234801561001057600080fd5b506040516101e63803806101e68339818101604052602081101561003357600080fd5b8101908080519060200190929190505050600073ffffffffffffffffffffffffffffffffffffffff168173ffffffffffffffffffffffffffffffffffffffff1614156100ca576040517f08c379a00000000000000000000000000000000000000000000000000000000081526004018080602001828103825260228152602001806101c46022913960400191505060405180910390fd5b806000806101000a81548173ffffffffffffffffffffffffffffffffffffffff021916908373ffffffffffffffffffffffffffffffffffffffff1602179055505060ab806101196000396000f3fe608060405273ffffffffffffffffffffffffffffffffffffffff600054167fa619486e0000000000000000000000000000000000000000000000000000000060003514156050578060005260206000f35b3660008037600080366000845af43d6000803e60008114156070573d6000fd5b3d6000f3fea264697066735822122003d1488ee65e08fa41e58e888a9865554c535f2c77126a82cb4c0f917f31441364736f6c63430007060033496e76616c69642073696e676c65746f6e20616464726573732070726f7669646564"
);

// ============================================================================
// Entry point version
// ============================================================================

/// EntryPoint version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// ERC-4337 v0.6, flat user operation layout
    V06,
    /// ERC-4337 v0.7, packed user operation layout
    #[default]
    V07,
}

impl EntryPointVersion {
    /// Canonical entry point address for this version
    pub fn entry_point(&self) -> Address {
        match self {
            EntryPointVersion::V06 => ENTRY_POINT_V06,
            EntryPointVersion::V07 => ENTRY_POINT_V07,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPointVersion::V06 => "v0.6",
            EntryPointVersion::V07 => "v0.7",
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryPointVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "v0.6" | "0.6" => Ok(EntryPointVersion::V06),
            "v0.7" | "0.7" => Ok(EntryPointVersion::V07),
            other => Err(Error::UnsupportedEntryPoint(other.to_string())),
        }
    }
}

// ============================================================================
// Account configuration
// ============================================================================

/// Immutable set of protocol addresses and defaults for one Safe deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeAccountConfig {
    /// Entry point version
    pub entry_point_version: EntryPointVersion,
    /// Entry point contract
    pub entry_point: Address,
    /// Safe singleton the proxy delegates to
    pub safe_singleton: Address,
    /// SafeProxyFactory
    pub proxy_factory: Address,
    /// Proxy creation bytecode used in CREATE2 address derivation
    pub proxy_creation_code: Bytes,
    /// Safe4337Module, also the fallback handler for native accounts
    pub safe_4337_module: Address,
    /// Helper delegate-called during setup to enable modules
    pub safe_module_setup: Address,
    /// MultiSend (supports delegate calls)
    pub multi_send: Address,
    /// MultiSendCallOnly
    pub multi_send_call_only: Address,
    /// WebAuthn shared signer
    pub webauthn_shared_signer: Address,
    /// Fallback P-256 verifier contract
    pub p256_verifier: Address,
    /// RIP-7212 precompile address, 0 when the chain has none
    pub p256_precompile: u16,
    /// Whether the account installs the Safe7579 adapter
    pub erc7579: bool,
    /// Safe7579 adapter
    pub safe_7579: Address,
    /// ERC-7484 module registry
    pub registry: Address,
    /// Trusted attesters for the registry
    pub attesters: Vec<Address>,
    /// Number of attesters that must vouch for a module
    pub attesters_threshold: u8,
    /// Smart-sessions validator module
    pub smart_sessions: Address,
    /// Default session validator
    pub ownable_validator: Address,
    /// Sudo policy
    pub sudo_policy: Address,
    /// Time-frame policy
    pub time_frame_policy: Address,
    /// Target chain
    pub chain_id: Option<ChainId>,
    /// Authenticator ceremony timeout in seconds
    pub passkey_timeout_secs: u64,
}

impl Default for SafeAccountConfig {
    fn default() -> Self {
        Self::v07()
    }
}

impl SafeAccountConfig {
    fn base(version: EntryPointVersion, module: Address, module_setup: Address) -> Self {
        Self {
            entry_point_version: version,
            entry_point: version.entry_point(),
            safe_singleton: SAFE_L2_SINGLETON,
            proxy_factory: SAFE_PROXY_FACTORY,
            proxy_creation_code: SAFE_PROXY_CREATION_CODE,
            safe_4337_module: module,
            safe_module_setup: module_setup,
            multi_send: MULTI_SEND,
            multi_send_call_only: MULTI_SEND_CALL_ONLY,
            webauthn_shared_signer: WEBAUTHN_SHARED_SIGNER,
            p256_verifier: FCL_P256_VERIFIER,
            p256_precompile: 0,
            erc7579: false,
            safe_7579: SAFE_7579_ADAPTER,
            registry: MODULE_REGISTRY,
            attesters: vec![RHINESTONE_ATTESTER, MOCK_ATTESTER],
            attesters_threshold: 1,
            smart_sessions: SMART_SESSIONS,
            ownable_validator: OWNABLE_VALIDATOR,
            sudo_policy: SUDO_POLICY,
            time_frame_policy: TIME_FRAME_POLICY,
            chain_id: None,
            passkey_timeout_secs: DEFAULT_PASSKEY_TIMEOUT.as_secs(),
        }
    }

    /// Entry point v0.6 with Safe4337Module 0.2.0
    pub fn v06() -> Self {
        Self::base(
            EntryPointVersion::V06,
            SAFE_4337_MODULE_V06,
            ADD_MODULES_LIB_V06,
        )
    }

    /// Entry point v0.7 with Safe4337Module 0.3.0
    pub fn v07() -> Self {
        Self::base(
            EntryPointVersion::V07,
            SAFE_4337_MODULE_V07,
            SAFE_MODULE_SETUP_V07,
        )
    }

    /// Preset for a version string such as `"v0.7"`
    pub fn for_version(version: &str) -> Result<Self> {
        Ok(match version.parse::<EntryPointVersion>()? {
            EntryPointVersion::V06 => Self::v06(),
            EntryPointVersion::V07 => Self::v07(),
        })
    }

    /// Set the chain id
    pub fn with_chain_id(mut self, chain_id: impl Into<ChainId>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    /// Install the Safe7579 adapter at deployment
    pub fn with_erc7579(mut self, enabled: bool) -> Self {
        self.erc7579 = enabled;
        self
    }

    /// Override the registry attesters
    pub fn with_attesters(mut self, attesters: Vec<Address>, threshold: u8) -> Self {
        self.attesters = attesters;
        self.attesters_threshold = threshold;
        self
    }

    /// Override the P-256 verifier pair
    pub fn with_p256_verifier(mut self, verifier: Address, precompile: u16) -> Self {
        self.p256_verifier = verifier;
        self.p256_precompile = precompile;
        self
    }

    /// Override the entry point address, keeping the version
    pub fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Override the Safe singleton
    pub fn with_singleton(mut self, singleton: Address) -> Self {
        self.safe_singleton = singleton;
        self
    }

    /// Set the authenticator timeout
    pub fn with_passkey_timeout(mut self, timeout: Duration) -> Self {
        self.passkey_timeout_secs = timeout.as_secs();
        self
    }

    /// Configured chain id, or [`Error::MissingChainId`]
    pub fn chain_id(&self) -> Result<ChainId> {
        self.chain_id.ok_or(Error::MissingChainId)
    }

    /// Authenticator ceremony timeout
    pub fn passkey_timeout(&self) -> Duration {
        Duration::from_secs(self.passkey_timeout_secs)
    }

    /// Module that validates user operations, which is also the EIP-712
    /// verifying contract for `SafeOp`
    pub fn validation_module(&self) -> Address {
        if self.erc7579 {
            self.safe_7579
        } else {
            self.safe_4337_module
        }
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.erc7579 && self.entry_point_version != EntryPointVersion::V07 {
            return Err(Error::UnsupportedEntryPoint(format!(
                "{} with Safe7579",
                self.entry_point_version
            )));
        }
        if self.proxy_creation_code.is_empty() {
            return Err(Error::InvalidConfig("proxy creation code is empty".into()));
        }
        if self.erc7579 && self.attesters_threshold as usize > self.attesters.len() {
            return Err(Error::InvalidConfig(format!(
                "attester threshold {} exceeds {} attesters",
                self.attesters_threshold,
                self.attesters.len()
            )));
        }
        Ok(())
    }
}
