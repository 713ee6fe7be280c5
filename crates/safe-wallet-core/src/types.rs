//! Core types shared by every builder and signer
//!
//! Chain identifiers, ECDSA signatures, on-chain calls and the small hex and
//! hashing helpers the rest of the crate relies on.

use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

/// EVM chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const ETHEREUM_MAINNET: ChainId = ChainId(1);
    pub const ETHEREUM_SEPOLIA: ChainId = ChainId(11155111);
    pub const ARBITRUM_ONE: ChainId = ChainId(42161);
    pub const OPTIMISM: ChainId = ChainId(10);
    pub const BASE: ChainId = ChainId(8453);
    pub const BASE_SEPOLIA: ChainId = ChainId(84532);
    pub const POLYGON: ChainId = ChainId(137);
    pub const GNOSIS: ChainId = ChainId(100);

    /// Get the name for this chain
    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "Ethereum Mainnet",
            11155111 => "Ethereum Sepolia",
            42161 => "Arbitrum One",
            10 => "Optimism",
            8453 => "Base",
            84532 => "Base Sepolia",
            137 => "Polygon",
            100 => "Gnosis",
            _ => "Unknown Chain",
        }
    }

    /// Hex quantity form used by wallet RPC payloads (`0x1`, `0x2105`)
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// ECDSA signature (r, s, v)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes)
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Length of an `r || s || v` signature
    pub const LEN: usize = 65;

    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Get v value (27 or 28)
    pub fn v(&self) -> u8 {
        self.recovery_id + 27
    }

    /// Convert to the 65-byte `r || s || v` form
    pub fn to_rsv_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v();
        bytes
    }

    /// Parse a 65-byte `r || s || v` signature; v may be 0/1 or 27/28
    pub fn from_rsv_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(Error::InvalidLength {
                field: "signature",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let recovery_id = match bytes[64] {
            0 | 27 => 0,
            1 | 28 => 1,
            v => return Err(Error::Crypto(format!("invalid recovery byte {v}"))),
        };
        Ok(Self { r, s, recovery_id })
    }
}

/// A single on-chain call issued by the account
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Call {
    /// Target contract or recipient
    pub to: Address,
    /// Native value in wei
    #[serde(default)]
    pub value: U256,
    /// Calldata
    #[serde(default)]
    pub data: Bytes,
}

impl Call {
    /// Create a new call
    pub fn new(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value,
            data: data.into(),
        }
    }

    /// Plain value transfer
    pub fn transfer(to: Address, value: U256) -> Self {
        Self::new(to, value, Bytes::new())
    }

    /// Get the function selector (first 4 bytes of data)
    pub fn function_selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).map(|s| {
            let mut selector = [0u8; 4];
            selector.copy_from_slice(s);
            selector
        })
    }
}

/// Compute Keccak256 hash of data
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    let mut hasher = Keccak::v256();
    hasher.update(data.as_ref());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    B256::from(hash)
}

/// Decode a `0x`-prefixed (or bare) hex string, failing fast on odd length
pub fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>> {
    let s = value.strip_prefix("0x").unwrap_or(value);
    if s.len() % 2 != 0 {
        return Err(Error::InvalidHex {
            field,
            reason: format!("odd number of digits ({})", s.len()),
        });
    }
    hex::decode(s).map_err(|e| Error::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

/// Parse a 20-byte address from hex
pub fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    let bytes = decode_hex(field, value)?;
    if bytes.len() != 20 {
        return Err(Error::InvalidLength {
            field,
            expected: 20,
            actual: bytes.len(),
        });
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse a 32-byte word from hex
pub fn parse_b256(field: &'static str, value: &str) -> Result<B256> {
    let bytes = decode_hex(field, value)?;
    if bytes.len() != 32 {
        return Err(Error::InvalidLength {
            field,
            expected: 32,
            actual: bytes.len(),
        });
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse a hex or decimal quantity
pub fn parse_u256(field: &'static str, value: &str) -> Result<U256> {
    U256::from_str(value).map_err(|e| Error::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

/// Format bytes as `0x`-prefixed hex
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}
