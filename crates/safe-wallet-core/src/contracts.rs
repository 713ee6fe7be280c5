//! ABI surface of the contracts this crate produces calldata for

#![allow(missing_docs)]

use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

sol! {
    #![sol(all_derives)]

    /// Safe v1.4.1 singleton
    interface ISafe {
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;

        function isModuleEnabled(address module) external view returns (bool);

        function getOwners() external view returns (address[] memory);

        function getThreshold() external view returns (uint256);
    }

    /// SafeProxyFactory v1.4.1
    interface ISafeProxyFactory {
        function createProxyWithNonce(
            address _singleton,
            bytes memory initializer,
            uint256 saltNonce
        ) external returns (address proxy);

        function proxyCreationCode() external pure returns (bytes memory);
    }

    /// SafeModuleSetup / AddModulesLib, delegate-called from `setup`
    interface ISafeModuleSetup {
        function enableModules(address[] calldata modules) external;
    }

    /// MultiSend and MultiSendCallOnly
    interface IMultiSend {
        function multiSend(bytes memory transactions) external payable;
    }

    /// Safe4337Module execution entry points
    interface ISafe4337Module {
        function executeUserOp(address to, uint256 value, bytes calldata data, uint8 operation) external;

        function executeUserOpWithErrorString(address to, uint256 value, bytes calldata data, uint8 operation) external;
    }

    /// Signer configuration stored by the WebAuthn shared signer
    struct SharedSignerConfig {
        uint256 x;
        uint256 y;
        uint176 verifiers;
    }

    /// Safe WebAuthn shared signer
    interface ISafeWebAuthnSharedSigner {
        function configure(SharedSignerConfig signer) external;

        function getConfiguration(address account) external view returns (SharedSignerConfig memory);
    }

    /// Module installed through the Safe7579 adapter
    struct ModuleInit {
        address module;
        bytes initData;
    }

    /// ERC-7484 registry wiring for the Safe7579 adapter
    struct RegistryInit {
        address registry;
        address[] attesters;
        uint8 threshold;
    }

    /// Safe7579 adapter
    interface ISafe7579 {
        function initializeAccount(
            ModuleInit[] calldata validators,
            ModuleInit[] calldata executors,
            ModuleInit[] calldata fallbacks,
            ModuleInit[] calldata hooks,
            RegistryInit calldata registryInit
        ) external;
    }

    /// One entry of an ERC-7579 batch
    #[derive(Serialize, Deserialize)]
    struct Execution {
        address target;
        uint256 value;
        bytes callData;
    }

    /// ERC-7579 account surface
    interface IERC7579Account {
        function execute(bytes32 mode, bytes calldata executionCalldata) external payable;

        function installModule(uint256 moduleTypeId, address module, bytes calldata initData) external payable;

        function uninstallModule(uint256 moduleTypeId, address module, bytes calldata deInitData) external payable;

        function isModuleInstalled(uint256 moduleTypeId, address module, bytes calldata additionalContext) external view returns (bool);
    }

    /// ERC-4337 entry point nonce manager
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    /// Smart-sessions policy reference
    #[derive(Serialize, Deserialize)]
    struct PolicyData {
        address policy;
        bytes initData;
    }

    /// Action a session may perform
    #[derive(Serialize, Deserialize)]
    struct ActionData {
        bytes4 actionTargetSelector;
        address actionTarget;
        PolicyData[] actionPolicies;
    }

    #[derive(Serialize, Deserialize)]
    struct ERC7739Context {
        bytes32 appDomainSeparator;
        string[] contentName;
    }

    #[derive(Serialize, Deserialize)]
    struct ERC7739Data {
        ERC7739Context[] allowedERC7739Content;
        PolicyData[] erc1271Policies;
    }

    /// Smart-sessions session definition
    #[derive(Serialize, Deserialize)]
    struct Session {
        address sessionValidator;
        bytes sessionValidatorInitData;
        bytes32 salt;
        PolicyData[] userOpPolicies;
        ERC7739Data erc7739Policies;
        ActionData[] actions;
        bool permit4337Paymaster;
    }

    /// Smart-sessions validator module
    interface ISmartSessions {
        function enableSessions(Session[] calldata sessions) external returns (bytes32[] memory permissionIds);

        function removeSession(bytes32 permissionId) external;

        function isPermissionEnabled(bytes32 permissionId, address account) external view returns (bool);
    }
}

/// ERC-7579 module type ids
pub mod module_type {
    pub const VALIDATOR: u8 = 1;
    pub const EXECUTOR: u8 = 2;
    pub const FALLBACK: u8 = 3;
    pub const HOOK: u8 = 4;
}
