use blake2::{digest::consts::U32, Blake2b, Digest};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryInto,
    fmt::{Display, Error, Formatter},
    str::FromStr,
};

use super::CryptoError;

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

pub type Blake2b256 = Blake2b<U32>;

// Block hashes, frontiers, links and seeds all share this 32 bytes representation
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash::new([0; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; HASH_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    // Nano nodes render hashes as upper case hex
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            len,
            expected: HASH_SIZE,
        })?;
        Ok(Hash::new(bytes))
    }
}

impl FromStr for Hash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

// Hash a byte array using blake2b with a 256 bits output
#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    let result: [u8; HASH_SIZE] = Blake2b256::digest(value).into();
    Hash(result)
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        if hex.len() != HASH_SIZE * 2 {
            return Err(SerdeError::custom("Invalid hex length"));
        }

        Hash::from_hex(&hex).map_err(SerdeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_upper_case_and_parses_both_cases() {
        let hash = Hash::new([0xab; HASH_SIZE]);
        assert_eq!(hash.to_hex(), "AB".repeat(HASH_SIZE));
        assert_eq!(Hash::from_hex(&"ab".repeat(HASH_SIZE)).unwrap(), hash);
    }

    #[test]
    fn test_invalid_length_is_rejected() {
        let err = Hash::from_hex("ABCD").unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength {
                len: 2,
                expected: HASH_SIZE
            }
        );
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let hash = hash(b"nano");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
        assert!(serde_json::from_str::<Hash>("\"00\"").is_err());
    }
}
