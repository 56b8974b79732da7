//! Unified error type for the bridge core.
//!
//! Remote calls raise these internally; public `Engine` operations catch
//! them and return a formatted message instead of propagating (§7).

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("cannot reach {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("query rejected: {message}")]
    Query { message: String, field_hint: Option<String> },

    #[error("unexpected error ({kind}): {message}")]
    Unexpected { kind: String, message: String },
}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Connection { .. })
    }

    /// Render the caller-facing message per the propagation policy in §7:
    /// connection errors name the host, not-found hints at schema discovery,
    /// query errors surface the server's text and a field hint when present.
    pub fn to_message(&self, table_hint: Option<&str>) -> String {
        match self {
            BridgeError::Connection { host, reason } => {
                format!("Error: cannot reach {host} ({reason}). Retry, or switch tenant.")
            }
            BridgeError::Authentication { reason } => {
                format!("Error: authentication failed ({reason}). Check credentials and privileges.")
            }
            BridgeError::NotFound { what } => {
                let mut msg = format!("Error: not found — {what}.");
                if let Some(t) = table_hint {
                    msg.push_str(&format!(" Call get_schema('{t}') to confirm field names."));
                }
                msg
            }
            BridgeError::Query { message, field_hint } => {
                let mut msg = format!("Error: query rejected — {message}");
                if let Some(field) = field_hint {
                    msg.push_str(&format!(" (field '{field}' — call get_schema to verify)"));
                }
                msg
            }
            BridgeError::Unexpected { kind, message } => {
                format!("Error: {kind}: {message}")
            }
        }
    }
}
