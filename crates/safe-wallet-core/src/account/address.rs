//! Counterfactual Safe address prediction
//!
//! SafeProxyFactory deploys proxies with CREATE2:
//!
//! ```text
//! salt         = keccak256(keccak256(initializer) || uint256(saltNonce))
//! initCodeHash = keccak256(proxyCreationCode || uint256(singleton))
//! address      = keccak256(0xff || factory || salt || initCodeHash)[12..]
//! ```

use crate::Result;
use crate::types::{decode_hex, keccak256, parse_address};
use alloy_primitives::{Address, B256, U256};

/// Inputs to [`predict_address`]
#[derive(Debug, Clone, Copy)]
pub struct AddressPrediction<'a> {
    pub factory: Address,
    pub proxy_creation_code: &'a [u8],
    pub singleton: Address,
    pub initializer: &'a [u8],
    pub salt_nonce: U256,
}

impl AddressPrediction<'_> {
    /// Compute the proxy address
    pub fn predict(&self) -> Address {
        let salt = deployment_salt(self.initializer, self.salt_nonce);
        let code_hash = init_code_hash(self.proxy_creation_code, self.singleton);
        create2_address(self.factory, salt, code_hash)
    }
}

/// CREATE2 salt used by `createProxyWithNonce`
pub fn deployment_salt(initializer: &[u8], salt_nonce: U256) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(keccak256(initializer).as_slice());
    preimage[32..].copy_from_slice(&salt_nonce.to_be_bytes::<32>());
    keccak256(preimage)
}

/// Hash of the proxy deployment code with the singleton constructor argument
pub fn init_code_hash(proxy_creation_code: &[u8], singleton: Address) -> B256 {
    let mut code = Vec::with_capacity(proxy_creation_code.len() + 32);
    code.extend_from_slice(proxy_creation_code);
    code.extend_from_slice(singleton.into_word().as_slice());
    keccak256(code)
}

/// `keccak256(0xff || deployer || salt || initCodeHash)[12..]`
pub fn create2_address(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer.as_slice());
    preimage[21..53].copy_from_slice(salt.as_slice());
    preimage[53..].copy_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

/// Predict the proxy address
pub fn predict_address(
    factory: Address,
    proxy_creation_code: &[u8],
    singleton: Address,
    initializer: &[u8],
    salt_nonce: U256,
) -> Address {
    AddressPrediction {
        factory,
        proxy_creation_code,
        singleton,
        initializer,
        salt_nonce,
    }
    .predict()
}

/// Predict from hex-encoded inputs, failing on odd-length hex or
/// wrong-width addresses
pub fn predict_address_hex(
    factory: &str,
    proxy_creation_code: &str,
    singleton: &str,
    initializer: &str,
    salt_nonce: U256,
) -> Result<Address> {
    let factory = parse_address("factory", factory)?;
    let singleton = parse_address("singleton", singleton)?;
    let code = decode_hex("proxyCreationCode", proxy_creation_code)?;
    let initializer = decode_hex("initializer", initializer)?;
    Ok(predict_address(
        factory,
        &code,
        singleton,
        &initializer,
        salt_nonce,
    ))
}
