//! MultiSend transaction packing
//!
//! Each sub-transaction is packed as
//! `operation(1) || to(20) || value(32) || dataLength(32) || data`
//! and the concatenation is handed to `multiSend(bytes)`.

use crate::contracts::IMultiSend;
use crate::types::Call;
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

const HEADER_LEN: usize = 1 + 20 + 32 + 32;

/// Safe operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

impl TryFrom<u8> for Operation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(Error::abi("operation", format!("unknown MultiSend operation {other}"))),
        }
    }
}

/// One MultiSend sub-transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
    pub operation: Operation,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl MetaTransaction {
    /// Plain call
    pub fn call(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            operation: Operation::Call,
            to,
            value,
            data: data.into(),
        }
    }

    /// Delegate call with zero value
    pub fn delegate_call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            operation: Operation::DelegateCall,
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    fn packed_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }
}

impl From<&Call> for MetaTransaction {
    fn from(call: &Call) -> Self {
        MetaTransaction::call(call.to, call.value, call.data.clone())
    }
}

/// Pack sub-transactions into the MultiSend byte stream
pub fn pack_transactions(transactions: &[MetaTransaction]) -> Bytes {
    let total = transactions.iter().map(MetaTransaction::packed_len).sum();
    let mut packed = Vec::with_capacity(total);
    for tx in transactions {
        packed.push(tx.operation as u8);
        packed.extend_from_slice(tx.to.as_slice());
        packed.extend_from_slice(&tx.value.to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(tx.data.len()).to_be_bytes::<32>());
        packed.extend_from_slice(&tx.data);
    }
    packed.into()
}

/// Parse a MultiSend byte stream back into sub-transactions
pub fn unpack_transactions(packed: &[u8]) -> Result<Vec<MetaTransaction>> {
    let mut transactions = Vec::new();
    let mut cursor = 0;
    while cursor < packed.len() {
        let remaining = packed.len() - cursor;
        if remaining < HEADER_LEN {
            return Err(Error::InvalidLength {
                field: "multiSend transaction header",
                expected: HEADER_LEN,
                actual: remaining,
            });
        }
        let header = &packed[cursor..cursor + HEADER_LEN];
        let operation = Operation::try_from(header[0])?;
        let to = Address::from_slice(&header[1..21]);
        let value = U256::from_be_slice(&header[21..53]);
        let data_len = U256::from_be_slice(&header[53..85]);
        let available = remaining - HEADER_LEN;
        let data_len = usize::try_from(data_len)
            .ok()
            .filter(|len| *len <= available)
            .ok_or(Error::InvalidLength {
                field: "multiSend transaction data",
                expected: usize::try_from(data_len).unwrap_or(usize::MAX),
                actual: available,
            })?;
        let start = cursor + HEADER_LEN;
        transactions.push(MetaTransaction {
            operation,
            to,
            value,
            data: Bytes::copy_from_slice(&packed[start..start + data_len]),
        });
        cursor = start + data_len;
    }
    Ok(transactions)
}

/// `multiSend(bytes)` calldata for the given sub-transactions
pub fn encode_multi_send(transactions: &[MetaTransaction]) -> Bytes {
    IMultiSend::multiSendCall {
        transactions: pack_transactions(transactions),
    }
    .abi_encode()
    .into()
}

/// Decode `multiSend(bytes)` calldata
pub fn decode_multi_send(calldata: &[u8]) -> Result<Vec<MetaTransaction>> {
    let call = IMultiSend::multiSendCall::abi_decode(calldata, true)
        .map_err(|e| Error::abi("multiSend", e))?;
    unpack_transactions(&call.transactions)
}
