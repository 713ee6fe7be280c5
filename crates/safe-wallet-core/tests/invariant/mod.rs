//! Invariant tests module

pub mod signature_invariant;
