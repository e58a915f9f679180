use blake2::{digest::consts::U5, Blake2b, Digest};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::{CryptoError, Hash, PublicKey, PUBLIC_KEY_SIZE};

pub const PREFIX_NANO: &str = "nano_";
pub const PREFIX_XRB: &str = "xrb_";

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
// 4 padding bits + 256 key bits
const KEY_CHARS: usize = 52;
const KEY_PADDING_BITS: usize = 4;
// 40 bits of checksum
const CHECKSUM_CHARS: usize = 8;
const CHECKSUM_SIZE: usize = 5;

type Blake2b40 = Blake2b<U5>;

/// Human readable form of an account public key.
#[derive(Clone, Copy, PartialEq, Eq, std::hash::Hash, Debug, PartialOrd, Ord)]
pub struct Address(PublicKey);

impl Address {
    pub fn new(key: PublicKey) -> Self {
        Self(key)
    }

    // Any 32 bytes value can be rendered as an account,
    // this is used to derive a fresh representative from a frontier hash
    pub fn from_hash(hash: &Hash) -> Self {
        Self(PublicKey::from(*hash))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    pub fn to_public_key(self) -> PublicKey {
        self.0
    }
}

fn checksum(key: &PublicKey) -> [u8; CHECKSUM_SIZE] {
    let digest = Blake2b40::digest(key.as_bytes());
    let mut out = [0u8; CHECKSUM_SIZE];
    // The checksum is rendered byte-reversed
    for (i, byte) in digest.iter().rev().enumerate() {
        out[i] = *byte;
    }
    out
}

fn encode_base32(bytes: &[u8], padding_bits: usize, out: &mut String) {
    let total_bits = padding_bits + bytes.len() * 8;
    let bit_at = |index: usize| -> u8 {
        if index < padding_bits {
            return 0;
        }
        let index = index - padding_bits;
        (bytes[index / 8] >> (7 - index % 8)) & 1
    };

    for chunk in 0..total_bits / 5 {
        let mut value = 0u8;
        for bit in 0..5 {
            value = (value << 1) | bit_at(chunk * 5 + bit);
        }
        out.push(ALPHABET[value as usize] as char);
    }
}

fn decode_base32(input: &str, padding_bits: usize, out: &mut [u8]) -> Result<(), CryptoError> {
    let mut bits: Vec<u8> = Vec::with_capacity(input.len() * 5);
    for c in input.bytes() {
        let value = ALPHABET
            .iter()
            .position(|a| *a == c)
            .ok_or_else(|| CryptoError::InvalidAddress(format!("invalid character '{}'", c as char)))?;
        for bit in (0..5).rev() {
            bits.push(((value >> bit) & 1) as u8);
        }
    }

    if bits.len() != padding_bits + out.len() * 8 {
        return Err(CryptoError::InvalidAddress("invalid length".to_string()));
    }

    if bits[..padding_bits].iter().any(|b| *b != 0) {
        return Err(CryptoError::InvalidAddress("non-zero padding".to_string()));
    }

    for (i, byte) in out.iter_mut().enumerate() {
        *byte = bits[padding_bits + i * 8..padding_bits + (i + 1) * 8]
            .iter()
            .fold(0u8, |acc, b| (acc << 1) | b);
    }
    Ok(())
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = String::with_capacity(PREFIX_NANO.len() + KEY_CHARS + CHECKSUM_CHARS);
        s.push_str(PREFIX_NANO);
        encode_base32(self.0.as_bytes(), KEY_PADDING_BITS, &mut s);
        encode_base32(&checksum(&self.0), 0, &mut s);
        f.write_str(&s)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(PREFIX_NANO)
            .or_else(|| s.strip_prefix(PREFIX_XRB))
            .ok_or_else(|| CryptoError::InvalidAddress(s.to_string()))?;

        // Length is counted in bytes, slicing below needs single byte chars
        if !body.is_ascii() || body.len() != KEY_CHARS + CHECKSUM_CHARS {
            return Err(CryptoError::InvalidAddress(s.to_string()));
        }

        let mut key = [0u8; PUBLIC_KEY_SIZE];
        decode_base32(&body[..KEY_CHARS], KEY_PADDING_BITS, &mut key)?;
        let mut expected = [0u8; CHECKSUM_SIZE];
        decode_base32(&body[KEY_CHARS..], 0, &mut expected)?;

        let key = PublicKey::from_bytes(key);
        if checksum(&key) != expected {
            return Err(CryptoError::InvalidChecksum(s.to_string()));
        }

        Ok(Self(key))
    }
}

impl From<PublicKey> for Address {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'a> Deserialize<'a> for Address {
    fn deserialize<D: serde::Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Address::from_str(&value).map_err(SerdeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burn_address() {
        let address = Address::new(PublicKey::from_bytes([0u8; 32]));
        assert_eq!(
            address.to_string(),
            "nano_1111111111111111111111111111111111111111111111111111hifc8npp"
        );
    }

    #[test]
    fn test_known_account_vector() {
        let key = PublicKey::from_hex(
            "C008B814A7D269A1FA3C6528B19201A24D797912DB9996FF02A1FF356E45552B",
        )
        .unwrap();
        let expected = "nano_3i1aq1cchnmbn9x5rsbap8b15akfh7wj7pwskuzi7ahz8oq6cobd99d4r3b7";
        assert_eq!(Address::new(key).to_string(), expected);
        assert_eq!(Address::from_str(expected).unwrap().to_public_key(), key);
    }

    #[test]
    fn test_legacy_prefix_is_accepted() {
        let address = Address::new(PublicKey::from_bytes([3u8; 32]));
        let legacy = address.to_string().replacen(PREFIX_NANO, PREFIX_XRB, 1);
        assert_eq!(Address::from_str(&legacy).unwrap(), address);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let address = Address::new(PublicKey::from_bytes([5u8; 32])).to_string();
        // Swap the last checksum character for another valid one
        let mut chars: Vec<char> = address.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '3' } else { '1' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            Address::from_str(&tampered),
            Err(CryptoError::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Address::from_str("nano_").is_err());
        assert!(Address::from_str("ban_1111").is_err());
        assert!(Address::from_str(&format!("nano_{}", "0".repeat(60))).is_err());
    }

    #[test]
    fn test_multibyte_body_is_rejected() {
        // 60 bytes, with a two byte char straddling the key/checksum boundary
        let body = format!("{}é{}", "1".repeat(51), "1".repeat(7));
        assert_eq!(body.len(), KEY_CHARS + CHECKSUM_CHARS);
        assert!(matches!(
            Address::from_str(&format!("nano_{}", body)),
            Err(CryptoError::InvalidAddress(_))
        ));
    }
}
