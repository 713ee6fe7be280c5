//! Unit tests module
//!
//! This module contains unit tests for individual components:
//! - Account setup and address prediction
//! - User operation codecs
//! - WebAuthn decoding
//! - Smart sessions

pub mod account_test;
pub mod session_test;
pub mod user_op_test;
pub mod webauthn_test;
