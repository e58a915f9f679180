use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::EncodingError;

pub const WORK_SIZE: usize = 8;

/// Proof-of-work nonce attached to a block.
///
/// Nodes exchange it as 16 hex digits in JSON; on the wire it is the same
/// value as a big endian u64.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Work(u64);

impl Work {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, EncodingError> {
        // from_str_radix alone would take a leading sign
        if value.is_empty()
            || value.len() > WORK_SIZE * 2
            || !value.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(EncodingError::InvalidWork(value.to_string()));
        }
        u64::from_str_radix(value, 16)
            .map(Self)
            .map_err(|_| EncodingError::InvalidWork(value.to_string()))
    }

    pub fn to_be_bytes(&self) -> [u8; WORK_SIZE] {
        self.0.to_be_bytes()
    }
}

impl FromStr for Work {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Work::from_hex(s)
    }
}

impl Display for Work {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Work {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Work {
    fn deserialize<D: serde::Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Work::from_hex(&value).map_err(SerdeError::custom)
    }
}
