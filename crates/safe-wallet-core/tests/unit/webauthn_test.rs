//! Unit tests for the WebAuthn codec

use crate::support::{ORIGIN, SoftwareAuthenticator};
use alloy_primitives::{B256, Bytes, U256};
use safe_wallet_core::{
    Error, ErrorKind,
    webauthn::{
        DecodedAssertion, MIN_AUTH_DATA_LEN, WebAuthnAssertion, client_data_fields_for_origin,
        decode_assertion, derive_coordinates, extract_client_data_fields,
        parse_attestation_object, parse_der_signature, stub_assertion, verify_assertion,
    },
};

#[test]
fn test_software_assertion_decodes_and_verifies() {
    let authenticator = SoftwareAuthenticator::new(ORIGIN);
    let challenge = B256::repeat_byte(0x5a);
    let assertion = authenticator.assertion(challenge);

    let decoded = decode_assertion(&assertion).unwrap();
    assert_eq!(decoded.authenticator_data.len(), MIN_AUTH_DATA_LEN);
    assert_eq!(decoded.client_data_fields, client_data_fields_for_origin(ORIGIN));
    verify_assertion(&decoded, challenge, &authenticator.public_key()).unwrap();

    assert!(verify_assertion(&decoded, B256::repeat_byte(0x5b), &authenticator.public_key()).is_err());
}

#[test]
fn test_encoded_assertion_round_trips() {
    let authenticator = SoftwareAuthenticator::new(ORIGIN);
    let decoded = decode_assertion(&authenticator.assertion(B256::ZERO)).unwrap();
    assert_eq!(DecodedAssertion::decode(&decoded.encode()).unwrap(), decoded);
}

#[test]
fn test_stub_matches_real_assertion_length() {
    let authenticator = SoftwareAuthenticator::new(ORIGIN);
    let real = decode_assertion(&authenticator.assertion(B256::repeat_byte(1))).unwrap();
    assert_eq!(stub_assertion(ORIGIN).encode().len(), real.encode().len());
}

#[test]
fn test_bad_der_tag_is_decoding_error() {
    let mut der = vec![0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];
    let err = parse_der_signature(&der).unwrap_err();
    assert!(matches!(err, Error::InvalidDer { .. }));
    assert_eq!(err.kind(), ErrorKind::Decoding);
    assert_eq!(err.field(), Some("signature"));

    der[0] = 0x30;
    assert_eq!(parse_der_signature(&der).unwrap(), (U256::from(1), U256::from(1)));
}

#[test]
fn test_der_length_mismatch_is_rejected() {
    let der = [0x30, 0x07, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];
    assert!(matches!(
        parse_der_signature(&der),
        Err(Error::InvalidDer { field: "signature", .. })
    ));
}

#[test]
fn test_assertion_with_bad_der_fails_decoding() {
    let authenticator = SoftwareAuthenticator::new(ORIGIN);
    let mut assertion = authenticator.assertion(B256::ZERO);
    let mut signature = assertion.signature.to_vec();
    signature[0] = 0x31;
    assertion.signature = Bytes::from(signature);
    assert!(matches!(
        decode_assertion(&assertion),
        Err(Error::InvalidDer { field: "signature", .. })
    ));
}

#[test]
fn test_short_authenticator_data_is_rejected() {
    let assertion = WebAuthnAssertion {
        authenticator_data: Bytes::from(vec![0u8; 36]),
        client_data_json: r#"{"type":"webauthn.get","challenge":"x"}"#.into(),
        signature: Bytes::new(),
    };
    assert!(matches!(
        decode_assertion(&assertion),
        Err(Error::InvalidLength {
            field: "authenticatorData",
            actual: 36,
            ..
        })
    ));
}

#[test]
fn test_client_data_fields_extraction() {
    let json = format!(
        r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://a.b","crossOrigin":false}}"#,
        "A".repeat(43)
    );
    assert_eq!(
        extract_client_data_fields(&json).unwrap(),
        r#""origin":"https://a.b","crossOrigin":false"#
    );

    let create = json.replace("webauthn.get", "webauthn.create");
    assert!(matches!(
        extract_client_data_fields(&create),
        Err(Error::InvalidClientData { field: "clientDataJSON", .. })
    ));
}

#[test]
fn test_attestation_object_yields_credential() {
    let authenticator = SoftwareAuthenticator::new(ORIGIN);
    let object = authenticator.attestation_object();

    let credential = parse_attestation_object(&object).unwrap();
    assert_eq!(credential, authenticator.credential());
    assert_eq!(derive_coordinates(&object).unwrap(), authenticator.public_key());

    assert!(matches!(
        parse_attestation_object(&[0xff, 0x00]),
        Err(Error::InvalidCbor { field: "attestationObject", .. })
    ));
}

#[test]
fn test_decode_errors_name_their_input() {
    let der = [0x30, 0x06, 0x02, 0x01, 0x01, 0x05, 0x01, 0x01];
    assert_eq!(parse_der_signature(&der).unwrap_err().field(), Some("s"));

    let err = DecodedAssertion::decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
    assert!(matches!(err, Error::Abi { .. }));
    assert_eq!(err.field(), Some("webauthnSignature"));
    assert!(err.to_string().contains("webauthnSignature"));
}
