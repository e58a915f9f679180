use thiserror::Error;

/// Errors returned while talking to a node RPC or a work server
#[derive(Error, Debug)]
pub enum RpcError {
    /// Request could not be sent or the body could not be read
    #[error("Transport error while calling '{action}': {reason}")]
    Transport { action: &'static str, reason: String },

    /// Non 2xx HTTP status
    #[error("HTTP error {status} while calling '{action}': {message}")]
    Status {
        action: &'static str,
        status: u16,
        message: String,
    },

    /// 2xx response carrying an `error` field
    #[error("Node rejected '{action}': {message}")]
    Node {
        action: &'static str,
        message: String,
    },

    /// `account_info` on an account that has no block yet
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Response did not match the expected record
    #[error("Invalid response to '{action}': {reason}")]
    InvalidResponse { action: &'static str, reason: String },

    #[error("Invalid RPC url '{0}'")]
    InvalidUrl(String),
}

impl RpcError {
    pub(crate) fn invalid_response(action: &'static str, reason: impl ToString) -> Self {
        Self::InvalidResponse {
            action,
            reason: reason.to_string(),
        }
    }

    pub fn action(&self) -> Option<&'static str> {
        match self {
            Self::Transport { action, .. }
            | Self::Status { action, .. }
            | Self::Node { action, .. }
            | Self::InvalidResponse { action, .. } => Some(action),
            Self::AccountNotFound(_) => Some("account_info"),
            Self::InvalidUrl(_) => None,
        }
    }
}
