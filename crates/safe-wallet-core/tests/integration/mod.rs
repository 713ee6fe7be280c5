//! Integration tests module
//!
//! Full flows against in-memory collaborators:
//! - Client lifecycle with each signer
//! - Wallet RPC dispatch

pub mod client_flow_test;
pub mod rpc_test;
