//! Account call-data encoding
//!
//! Two execution surfaces are supported:
//!
//! - ERC-7579 `execute(bytes32 mode, bytes executionCalldata)` for accounts
//!   with the Safe7579 adapter.
//! - Safe4337Module `executeUserOp(to, value, data, operation)` for native
//!   Safe accounts, where batches delegate-call into MultiSendCallOnly.

use crate::account::multisend::{MetaTransaction, Operation, encode_multi_send};
use crate::config::SafeAccountConfig;
use crate::contracts::{Execution, IERC7579Account, ISafe4337Module};
use crate::types::Call;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use serde::{Deserialize, Serialize};

// ============================================================================
// Execution mode word
// ============================================================================

/// ERC-7579 call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Call,
    BatchCall,
    DelegateCall,
}

impl CallType {
    pub fn byte(self) -> u8 {
        match self {
            CallType::Call => 0x00,
            CallType::BatchCall => 0x01,
            CallType::DelegateCall => 0xff,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(CallType::Call),
            0x01 => Ok(CallType::BatchCall),
            0xff => Ok(CallType::DelegateCall),
            other => Err(Error::abi("callType", format!("unknown call type {other:#04x}"))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            CallType::Call => "call",
            CallType::BatchCall => "batchcall",
            CallType::DelegateCall => "delegatecall",
        }
    }
}

/// ERC-7579 revert policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecType {
    /// Revert the whole execution on failure
    #[default]
    Default,
    /// Continue and emit on failure
    Try,
}

impl ExecType {
    pub fn byte(self) -> u8 {
        match self {
            ExecType::Default => 0x00,
            ExecType::Try => 0x01,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(ExecType::Default),
            0x01 => Ok(ExecType::Try),
            other => Err(Error::abi("execType", format!("unknown exec type {other:#04x}"))),
        }
    }
}

/// Packed execution mode:
/// `callType(1) || execType(1) || unused(4) || selector(4) || context(22)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionMode {
    pub call_type: CallType,
    pub exec_type: ExecType,
    pub selector: FixedBytes<4>,
    pub context: FixedBytes<22>,
}

impl ExecutionMode {
    pub fn new(call_type: CallType) -> Self {
        Self {
            call_type,
            exec_type: ExecType::Default,
            selector: FixedBytes::ZERO,
            context: FixedBytes::ZERO,
        }
    }

    pub fn call() -> Self {
        Self::new(CallType::Call)
    }

    pub fn batch() -> Self {
        Self::new(CallType::BatchCall)
    }

    pub fn delegate_call() -> Self {
        Self::new(CallType::DelegateCall)
    }

    pub fn with_exec_type(mut self, exec_type: ExecType) -> Self {
        self.exec_type = exec_type;
        self
    }

    pub fn with_selector(mut self, selector: [u8; 4]) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn with_context(mut self, context: [u8; 22]) -> Self {
        self.context = context.into();
        self
    }

    /// Pack into the 32-byte mode word
    pub fn encode(&self) -> B256 {
        let mut word = [0u8; 32];
        word[0] = self.call_type.byte();
        word[1] = self.exec_type.byte();
        word[6..10].copy_from_slice(self.selector.as_slice());
        word[10..].copy_from_slice(self.context.as_slice());
        B256::from(word)
    }

    /// Unpack a 32-byte mode word; the reserved bytes must be zero
    pub fn decode(word: B256) -> Result<Self> {
        if word[2..6] != [0u8; 4] {
            return Err(Error::abi("mode", "reserved bytes are not zero"));
        }
        Ok(Self {
            call_type: CallType::from_byte(word[0])?,
            exec_type: ExecType::from_byte(word[1])?,
            selector: FixedBytes::from_slice(&word[6..10]),
            context: FixedBytes::from_slice(&word[10..]),
        })
    }
}

// ============================================================================
// ERC-7579 encoding
// ============================================================================

/// Encode the `executionCalldata` argument for `mode`
///
/// Single call or delegate call: `target || value || data`.
/// Batch: `abi.encode(Execution[])`.
pub fn encode_execution_calldata(call_type: CallType, calls: &[Call]) -> Result<Bytes> {
    match (call_type, calls) {
        (_, []) => Err(Error::EmptyExecution),
        (CallType::Call | CallType::DelegateCall, [call]) => {
            let mut out = Vec::with_capacity(52 + call.data.len());
            out.extend_from_slice(call.to.as_slice());
            out.extend_from_slice(&call.value.to_be_bytes::<32>());
            out.extend_from_slice(&call.data);
            Ok(out.into())
        }
        (CallType::BatchCall, calls) => {
            let executions: Vec<Execution> = calls
                .iter()
                .map(|c| Execution {
                    target: c.to,
                    value: c.value,
                    callData: c.data.clone(),
                })
                .collect();
            Ok(executions.abi_encode().into())
        }
        (mode, calls) => Err(Error::ExecutionModeMismatch {
            mode: mode.name(),
            calls: calls.len(),
        }),
    }
}

/// `execute(bytes32,bytes)` calldata
pub fn encode_execute(mode: ExecutionMode, calls: &[Call]) -> Result<Bytes> {
    let execution_calldata = encode_execution_calldata(mode.call_type, calls)?;
    Ok(IERC7579Account::executeCall {
        mode: mode.encode(),
        executionCalldata: execution_calldata,
    }
    .abi_encode()
    .into())
}

/// `execute` calldata, choosing single or batch mode from the call count
pub fn encode_calls(calls: &[Call]) -> Result<Bytes> {
    let mode = if calls.len() > 1 {
        ExecutionMode::batch()
    } else {
        ExecutionMode::call()
    };
    encode_execute(mode, calls)
}

/// Decode `execute(bytes32,bytes)` calldata back into its mode and calls
pub fn decode_execute(calldata: &[u8]) -> Result<(ExecutionMode, Vec<Call>)> {
    let decoded = IERC7579Account::executeCall::abi_decode(calldata, true)
        .map_err(|e| Error::abi("execute", e))?;
    let mode = ExecutionMode::decode(decoded.mode)?;
    let data = &decoded.executionCalldata;
    let calls = match mode.call_type {
        CallType::Call | CallType::DelegateCall => {
            if data.len() < 52 {
                return Err(Error::InvalidLength {
                    field: "executionCalldata",
                    expected: 52,
                    actual: data.len(),
                });
            }
            vec![Call::new(
                Address::from_slice(&data[..20]),
                U256::from_be_slice(&data[20..52]),
                Bytes::copy_from_slice(&data[52..]),
            )]
        }
        CallType::BatchCall => Vec::<Execution>::abi_decode(data, true)
            .map_err(|e| Error::abi("executionCalldata", e))?
            .into_iter()
            .map(|e| Call::new(e.target, e.value, e.callData))
            .collect(),
    };
    Ok((mode, calls))
}

// ============================================================================
// Safe4337Module encoding
// ============================================================================

/// `executeUserOp` calldata for a native Safe account
///
/// A single call is executed directly; several calls are packed for
/// MultiSendCallOnly and executed through a delegate call.
pub fn encode_safe_execute_user_op(config: &SafeAccountConfig, calls: &[Call]) -> Result<Bytes> {
    let (to, value, data, operation) = match calls {
        [] => return Err(Error::EmptyExecution),
        [call] => (call.to, call.value, call.data.clone(), Operation::Call),
        calls => {
            let txs: Vec<MetaTransaction> = calls.iter().map(MetaTransaction::from).collect();
            (
                config.multi_send_call_only,
                U256::ZERO,
                encode_multi_send(&txs),
                Operation::DelegateCall,
            )
        }
    };
    Ok(ISafe4337Module::executeUserOpCall {
        to,
        value,
        data,
        operation: operation as u8,
    }
    .abi_encode()
    .into())
}

/// Encode calls for whichever execution surface `config` selects
pub fn encode_account_calls(config: &SafeAccountConfig, calls: &[Call]) -> Result<Bytes> {
    if config.erc7579 {
        encode_calls(calls)
    } else {
        encode_safe_execute_user_op(config, calls)
    }
}
