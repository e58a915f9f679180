use thiserror::Error;

#[derive(Error, Debug)]
pub enum P2pError {
    #[error("Cannot connect to peer {peer}: {reason}")]
    Connect { peer: String, reason: String },

    #[error("Handshake with {0} timed out")]
    HandshakeTimeout(String),

    #[error("Invalid handshake from {peer}: {reason}")]
    InvalidHandshake { peer: String, reason: String },

    #[error("Invalid message header: {0}")]
    InvalidHeader(String),

    #[error("Invalid peer address '{0}'")]
    InvalidAddress(String),

    #[error("Connection to {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
