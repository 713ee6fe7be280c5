//! WebAuthn assertion and attestation decoding
//!
//! Converts what a platform authenticator returns into the layout the Safe
//! WebAuthn shared signer verifies on chain:
//!
//! ```text
//! abi.encode(bytes authenticatorData, string clientDataFields, uint256 r, uint256 s)
//! ```
//!
//! `clientDataFields` is everything in the client data JSON after the
//! `type` and `challenge` members, which the verifier rebuilds itself.

use crate::{Error, Result};
use alloy_primitives::{B256, Bytes, U256, uint};
use alloy_sol_types::SolValue;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ciborium::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Order of the P-256 group
pub const P256_N: U256 =
    uint!(0xffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551_U256);

/// Authenticator data without attested credential data or extensions
pub const MIN_AUTH_DATA_LEN: usize = 37;

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

static CLIENT_DATA_RE: LazyLock<std::result::Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r#"^\{"type":"webauthn\.get","challenge":"[A-Za-z0-9\-_]{43}",(.*)\}$"#)
});

// ============================================================================
// Keys
// ============================================================================

/// Affine coordinates of a P-256 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P256PublicKey {
    pub x: U256,
    pub y: U256,
}

impl P256PublicKey {
    /// Build from coordinates, rejecting points not on the curve
    pub fn new(x: U256, y: U256) -> Result<Self> {
        let key = Self { x, y };
        key.validate()?;
        Ok(key)
    }

    /// SEC1 uncompressed encoding `0x04 || x || y`
    pub fn to_sec1_uncompressed(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0] = 0x04;
        out[1..33].copy_from_slice(&self.x.to_be_bytes::<32>());
        out[33..].copy_from_slice(&self.y.to_be_bytes::<32>());
        out
    }

    /// Parse any SEC1 encoding (compressed or uncompressed)
    pub fn from_sec1(bytes: &[u8]) -> Result<Self> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let key = p256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| invalid_public_key(e.to_string()))?;
        let point = key.to_encoded_point(false);
        match (point.x(), point.y()) {
            (Some(x), Some(y)) => Ok(Self {
                x: U256::from_be_slice(x),
                y: U256::from_be_slice(y),
            }),
            _ => Err(invalid_public_key("point at infinity")),
        }
    }

    /// Check the point lies on P-256
    pub fn validate(&self) -> Result<()> {
        p256::PublicKey::from_sec1_bytes(&self.to_sec1_uncompressed())
            .map(|_| ())
            .map_err(|e| invalid_public_key(e.to_string()))
    }

    /// `p256` verifying key for off-chain checks
    pub fn verifying_key(&self) -> Result<p256::ecdsa::VerifyingKey> {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.to_sec1_uncompressed())
            .map_err(|e| invalid_public_key(e.to_string()))
    }
}

/// Credential created by a platform authenticator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedCredential {
    /// Raw credential id
    pub credential_id: Bytes,
    /// Public key coordinates
    pub public_key: P256PublicKey,
}

impl AttestedCredential {
    /// Credential id in base64url, the form authenticators use
    pub fn credential_id_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.credential_id)
    }
}

// ============================================================================
// Assertions
// ============================================================================

/// Raw assertion returned by the authenticator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnAssertion {
    /// Authenticator data, verbatim
    pub authenticator_data: Bytes,
    /// Client data JSON, verbatim
    pub client_data_json: String,
    /// DER-encoded ECDSA signature
    pub signature: Bytes,
}

/// Assertion in the verifier's layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAssertion {
    pub authenticator_data: Bytes,
    pub client_data_fields: String,
    pub r: U256,
    pub s: U256,
}

impl DecodedAssertion {
    /// `abi.encode(bytes, string, uint256, uint256)`
    pub fn encode(&self) -> Bytes {
        (
            self.authenticator_data.clone(),
            self.client_data_fields.clone(),
            self.r,
            self.s,
        )
            .abi_encode_params()
            .into()
    }

    /// Inverse of [`DecodedAssertion::encode`]
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (authenticator_data, client_data_fields, r, s) =
            <(Bytes, String, U256, U256)>::abi_decode_params(data, true)
                .map_err(|e| Error::abi("webauthnSignature", e))?;
        Ok(Self {
            authenticator_data,
            client_data_fields,
            r,
            s,
        })
    }
}

/// Decode an authenticator assertion
pub fn decode_assertion(assertion: &WebAuthnAssertion) -> Result<DecodedAssertion> {
    if assertion.authenticator_data.len() < MIN_AUTH_DATA_LEN {
        return Err(Error::InvalidLength {
            field: "authenticatorData",
            expected: MIN_AUTH_DATA_LEN,
            actual: assertion.authenticator_data.len(),
        });
    }
    let client_data_fields = extract_client_data_fields(&assertion.client_data_json)?;
    let (r, s) = parse_der_signature(&assertion.signature)?;
    Ok(DecodedAssertion {
        authenticator_data: assertion.authenticator_data.clone(),
        client_data_fields: client_data_fields.to_string(),
        r,
        s,
    })
}

/// Client data members after `type` and `challenge`
pub fn extract_client_data_fields(client_data_json: &str) -> Result<&str> {
    let pattern = CLIENT_DATA_RE
        .as_ref()
        .map_err(|e| Error::InvalidClientData {
            field: "clientDataJSON",
            reason: e.to_string(),
        })?;
    pattern
        .captures(client_data_json)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            Error::InvalidClientData {
                field: "clientDataJSON",
                reason: "expected {\"type\":\"webauthn.get\",\"challenge\":\"<43 chars>\",...}".into(),
            }
        })
}

/// Challenge string an authenticator embeds for `hash`
pub fn challenge_for(hash: B256) -> String {
    URL_SAFE_NO_PAD.encode(hash.as_slice())
}

/// Rebuild the client data JSON the way the on-chain verifier does
pub fn client_data_json(hash: B256, fields: &str) -> String {
    format!(
        r#"{{"type":"webauthn.get","challenge":"{}",{}}}"#,
        challenge_for(hash),
        fields
    )
}

/// Digest an authenticator signs: `sha256(authData || sha256(clientDataJSON))`
pub fn signing_message_hash(authenticator_data: &[u8], client_data_json: &str) -> B256 {
    let client_data_hash = Sha256::digest(client_data_json.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(authenticator_data);
    hasher.update(client_data_hash);
    B256::from_slice(&hasher.finalize())
}

/// Check the assertion was made over `hash` and verifies under `key`
pub fn verify_assertion(
    assertion: &DecodedAssertion,
    hash: B256,
    key: &P256PublicKey,
) -> Result<()> {
    use p256::ecdsa::{Signature, signature::hazmat::PrehashVerifier};

    let json = client_data_json(hash, &assertion.client_data_fields);
    let digest = signing_message_hash(&assertion.authenticator_data, &json);
    let signature = Signature::from_scalars(
        assertion.r.to_be_bytes::<32>(),
        assertion.s.to_be_bytes::<32>(),
    )
    .map_err(|e| Error::Crypto(e.to_string()))?;
    key.verifying_key()?
        .verify_prehash(digest.as_slice(), &signature)
        .map_err(|e| Error::Crypto(e.to_string()))
}

// ============================================================================
// DER
// ============================================================================

/// Parse a DER `SEQUENCE { INTEGER r, INTEGER s }`
///
/// The sequence length must account for every byte, each integer must be
/// 1..=33 bytes, and both scalars must be in `1..n`.
pub fn parse_der_signature(der: &[u8]) -> Result<(U256, U256)> {
    if der.len() < 8 {
        return Err(invalid_der("signature", format!("{} bytes is too short", der.len())));
    }
    if der[0] != 0x30 {
        return Err(invalid_der(
            "signature",
            format!("expected SEQUENCE tag 0x30, found {:#04x}", der[0]),
        ));
    }
    let declared = der[1] as usize;
    if der[1] & 0x80 != 0 || declared != der.len() - 2 {
        return Err(invalid_der(
            "signature",
            format!(
                "SEQUENCE length {} does not match payload length {}",
                declared,
                der.len() - 2
            ),
        ));
    }
    let (r, offset) = read_integer(der, 2, "r")?;
    let (s, end) = read_integer(der, offset, "s")?;
    if end != der.len() {
        return Err(invalid_der(
            "signature",
            format!("{} trailing bytes after s", der.len() - end),
        ));
    }
    Ok((r, s))
}

fn read_integer(der: &[u8], offset: usize, name: &'static str) -> Result<(U256, usize)> {
    let header = der
        .get(offset..offset + 2)
        .ok_or_else(|| invalid_der(name, "header is truncated"))?;
    if header[0] != 0x02 {
        return Err(invalid_der(
            name,
            format!("expected INTEGER tag 0x02, found {:#04x}", header[0]),
        ));
    }
    let len = header[1] as usize;
    if len == 0 || len > 33 {
        return Err(invalid_der(name, format!("length {len} out of range")));
    }
    let start = offset + 2;
    let value = der
        .get(start..start + len)
        .ok_or_else(|| invalid_der(name, "value is truncated"))?;
    let value = if len == 33 {
        if value[0] != 0 {
            return Err(invalid_der(name, "exceeds 256 bits"));
        }
        &value[1..]
    } else {
        value
    };
    let scalar = U256::from_be_slice(value);
    if scalar.is_zero() || scalar >= P256_N {
        return Err(invalid_der(name, "not below the curve order"));
    }
    Ok((scalar, start + len))
}

fn invalid_der(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidDer {
        field,
        reason: reason.into(),
    }
}

fn invalid_cbor(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidCbor {
        field,
        reason: reason.into(),
    }
}

fn invalid_public_key(reason: impl Into<String>) -> Error {
    Error::InvalidPublicKey {
        field: "publicKey",
        reason: reason.into(),
    }
}

// ============================================================================
// Attestation
// ============================================================================

/// Extract the public key coordinates from a CBOR attestation object
pub fn derive_coordinates(attestation_object: &[u8]) -> Result<P256PublicKey> {
    parse_attestation_object(attestation_object).map(|c| c.public_key)
}

/// Decode a CBOR attestation object into its credential
pub fn parse_attestation_object(attestation_object: &[u8]) -> Result<AttestedCredential> {
    let value: Value = ciborium::de::from_reader(attestation_object)
        .map_err(|e| invalid_cbor("attestationObject", e.to_string()))?;
    let auth_data = map_get(&value, |k| k.as_text() == Some("authData"))
        .and_then(Value::as_bytes)
        .ok_or_else(|| invalid_cbor("attestationObject", "missing authData"))?;
    parse_attested_auth_data(auth_data)
}

/// Parse authenticator data carrying attested credential data
pub fn parse_attested_auth_data(auth_data: &[u8]) -> Result<AttestedCredential> {
    if auth_data.len() < MIN_AUTH_DATA_LEN + 18 {
        return Err(Error::InvalidLength {
            field: "authData",
            expected: MIN_AUTH_DATA_LEN + 18,
            actual: auth_data.len(),
        });
    }
    let flags = auth_data[32];
    if flags & FLAG_ATTESTED_CREDENTIAL == 0 {
        return Err(invalid_cbor("authData", "no attested credential"));
    }
    if flags & FLAG_USER_PRESENT == 0 {
        return Err(invalid_cbor("authData", "user presence flag not set"));
    }

    // rpIdHash(32) flags(1) signCount(4) aaguid(16) credentialIdLength(2)
    let id_len_offset = MIN_AUTH_DATA_LEN + 16;
    let id_len = u16::from_be_bytes([auth_data[id_len_offset], auth_data[id_len_offset + 1]]) as usize;
    let id_start = id_len_offset + 2;
    let credential_id = auth_data
        .get(id_start..id_start + id_len)
        .ok_or_else(|| invalid_cbor("authData", "credential id is truncated"))?;

    let cose: Value = ciborium::de::from_reader(&auth_data[id_start + id_len..])
        .map_err(|e| invalid_cbor("credentialPublicKey", e.to_string()))?;
    let public_key = cose_to_coordinates(&cose)?;

    Ok(AttestedCredential {
        credential_id: Bytes::copy_from_slice(credential_id),
        public_key,
    })
}

/// Convert a COSE_Key (EC2, ES256, P-256) into coordinates
fn cose_to_coordinates(cose: &Value) -> Result<P256PublicKey> {
    let int_field = |label: i128| {
        map_get(cose, |k| k.as_integer().map(i128::from) == Some(label))
            .and_then(Value::as_integer)
            .map(i128::from)
    };
    let bytes_field = |label: i128| {
        map_get(cose, |k| k.as_integer().map(i128::from) == Some(label)).and_then(Value::as_bytes)
    };

    // kty = EC2, alg = ES256, crv = P-256
    if int_field(1) != Some(2) || int_field(3) != Some(-7) || int_field(-1) != Some(1) {
        return Err(invalid_cbor(
            "credentialPublicKey",
            "not an ES256 P-256 key",
        ));
    }
    let x = bytes_field(-2).ok_or_else(|| invalid_cbor("credentialPublicKey", "missing x"))?;
    let y = bytes_field(-3).ok_or_else(|| invalid_cbor("credentialPublicKey", "missing y"))?;
    if x.len() != 32 || y.len() != 32 {
        return Err(Error::InvalidLength {
            field: "COSE coordinate",
            expected: 32,
            actual: if x.len() != 32 { x.len() } else { y.len() },
        });
    }
    P256PublicKey::new(U256::from_be_slice(x), U256::from_be_slice(y))
}

fn map_get(value: &Value, matches: impl Fn(&Value) -> bool) -> Option<&Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| matches(k))
        .map(|(_, v)| v)
}

// ============================================================================
// Stubs
// ============================================================================

/// Authenticator data used in stub signatures: `sha256("localhost") || 0x05 || 0`
pub fn dummy_authenticator_data() -> Bytes {
    let mut data = Vec::with_capacity(MIN_AUTH_DATA_LEN);
    data.extend_from_slice(&Sha256::digest(b"localhost"));
    data.push(0x05);
    data.extend_from_slice(&[0u8; 4]);
    data.into()
}

/// Client data fields an authenticator emits for `origin`
pub fn client_data_fields_for_origin(origin: &str) -> String {
    format!(r#""origin":"{origin}","crossOrigin":false"#)
}

/// Verifier-layout assertion with maximal scalars, for gas estimation
pub fn stub_assertion(origin: &str) -> DecodedAssertion {
    let filler = U256::from_be_bytes([0xec; 32]);
    DecodedAssertion {
        authenticator_data: dummy_authenticator_data(),
        client_data_fields: client_data_fields_for_origin(origin),
        r: filler,
        s: filler,
    }
}
