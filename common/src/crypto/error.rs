use thiserror::Error;

/// Errors that can occur while parsing or deriving key material
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hexadecimal string format
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Decoded value has an unexpected length
    #[error("Invalid length: {len} bytes, expected: {expected} bytes")]
    InvalidLength { len: usize, expected: usize },

    /// Invalid checksum in address
    #[error("Invalid checksum for address {0}")]
    InvalidChecksum(String),

    /// Address string is malformed or invalid
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),
}
