use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors raised while building wire bytes or parsing block fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid encoded block length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid balance '{0}': expected a decimal 128 bits unsigned integer")]
    InvalidBalance(String),

    #[error("Invalid work value '{0}': expected at most 16 hex digits")]
    InvalidWork(String),

    #[error("Unsupported block type '{0}'")]
    UnsupportedType(String),
}

impl EncodingError {
    pub fn field(field: &'static str, err: CryptoError) -> Self {
        Self::InvalidField {
            field,
            reason: err.to_string(),
        }
    }
}
