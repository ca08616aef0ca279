//! Error types for the fund orchestrator

use ethers::abi::ParamType;
use ethers::providers::{JsonRpcError, ProviderError, RpcError};
use serde_json::Value;
use thiserror::Error;

/// Main error type for orchestrated actions
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet capability unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Wrong network: required chain {expected}, wallet is on {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Chain {chain_id} is not registered with the wallet")]
    ChainUnrecognized { chain_id: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote call rejected: {0}")]
    RemoteRejected(String),

    #[error("Expected return value or event missing: {0}")]
    ParseFailure(String),

    #[error("Chain connection error: {0}")]
    ChainConnection(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Action '{action}' already in flight")]
    ActionInFlight { action: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Fatal conditions are surfaced to the user and never retried automatically
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::WalletUnavailable(_) | OrchestratorError::WrongNetwork { .. }
        )
    }

    /// Whether the whole action can simply be run again by the user
    pub fn is_user_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RemoteRejected(_)
                | OrchestratorError::ChainConnection(_)
                | OrchestratorError::Timeout { .. }
        )
    }

    /// The reason string carried by a rejection, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            OrchestratorError::RemoteRejected(r) if !r.is_empty() => Some(r),
            _ => None,
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Noisy prefix most nodes prepend to revert reasons
const REVERT_PREFIX: &str = "execution reverted: ";

/// Selector of the standard `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Strip the well-known revert prefix from an error message
pub fn strip_revert_prefix(message: &str) -> String {
    message
        .strip_prefix(REVERT_PREFIX)
        .unwrap_or(message)
        .to_string()
}

/// Extract the richest human-readable reason from a provider error.
///
/// Probes, in order: ABI-encoded revert data, structured error data message,
/// the JSON-RPC error message, and finally the stringified error.
pub fn rpc_reason(err: &ProviderError) -> String {
    if let Some(jsonrpc) = err.as_error_response() {
        return jsonrpc_reason(jsonrpc);
    }
    strip_revert_prefix(&err.to_string())
}

/// Extract a reason from a raw JSON-RPC error object
pub fn jsonrpc_reason(err: &JsonRpcError) -> String {
    if let Some(data) = err.data.as_ref() {
        if let Some(reason) = reason_from_error_data(data) {
            return reason;
        }
    }
    strip_revert_prefix(&err.message)
}

/// Duck-typed probe of the `data` field carried by node errors.
///
/// Accepts a hex revert blob, a nested `{ "data": "0x..." }`, or a nested
/// `{ "message": "..." }` shape.
fn reason_from_error_data(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => decode_revert_hex(s),
        Value::Object(map) => map
            .get("data")
            .and_then(reason_from_error_data)
            .or_else(|| {
                map.get("message")
                    .and_then(Value::as_str)
                    .map(strip_revert_prefix)
            }),
        _ => None,
    }
}

/// Decode an `Error(string)` revert payload from a hex string
fn decode_revert_hex(s: &str) -> Option<String> {
    let raw = hex::decode(s.trim_start_matches("0x")).ok()?;
    if raw.len() < 4 || raw[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let tokens = ethers::abi::decode(&[ParamType::String], &raw[4..]).ok()?;
    tokens.first().and_then(|t| t.clone().into_string())
}
