mod address;
mod hash;
mod keys;

pub mod error;

pub use address::*;
pub use error::CryptoError;
pub use hash::*;
pub use keys::*;
