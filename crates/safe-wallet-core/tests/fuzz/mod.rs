//! Fuzz tests module
//!
//! Property-based testing using proptest to find edge cases in the codecs.
