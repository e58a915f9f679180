use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

use super::{EncodingError, Raw, StateBlock, Work, WORK_SIZE};
use crate::crypto::{Hash, PublicKey, Signature, HASH_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

pub const ENCODED_BLOCK_SIZE: usize = 216;

// Field offsets inside an encoded block
const ACCOUNT_OFFSET: usize = 0;
const PREVIOUS_OFFSET: usize = 32;
const REPRESENTATIVE_OFFSET: usize = 64;
const BALANCE_OFFSET: usize = 96;
const LINK_OFFSET: usize = 112;
const SIGNATURE_OFFSET: usize = 144;
const WORK_OFFSET: usize = 208;

const BALANCE_SIZE: usize = 16;

/// Fixed size binary form of a state block, as published to peers.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedBlock([u8; ENCODED_BLOCK_SIZE]);

impl EncodedBlock {
    pub fn as_bytes(&self) -> &[u8; ENCODED_BLOCK_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(value).map_err(|e| EncodingError::InvalidField {
            field: "encoded block",
            reason: e.to_string(),
        })?;
        let got = bytes.len();
        let bytes: [u8; ENCODED_BLOCK_SIZE] =
            bytes.try_into().map_err(|_| EncodingError::InvalidLength {
                expected: ENCODED_BLOCK_SIZE,
                got,
            })?;
        Ok(Self(bytes))
    }

    pub fn decode(&self) -> Result<StateBlock, EncodingError> {
        decode(&self.0)
    }
}

impl AsRef<[u8]> for EncodedBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncodedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedBlock({})", self.to_hex())
    }
}

impl Serialize for EncodedBlock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for EncodedBlock {
    fn deserialize<D: serde::Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        EncodedBlock::from_hex(&value).map_err(SerdeError::custom)
    }
}

/// Serialize a block into its 216 bytes wire form.
///
/// Every integer is big endian: the balance is written as one 128 bits
/// value and the work nonce as one 64 bits value.
pub fn encode(block: &StateBlock) -> EncodedBlock {
    let mut out = [0u8; ENCODED_BLOCK_SIZE];
    out[ACCOUNT_OFFSET..PREVIOUS_OFFSET].copy_from_slice(block.account.as_bytes());
    out[PREVIOUS_OFFSET..REPRESENTATIVE_OFFSET].copy_from_slice(block.previous.as_bytes());
    out[REPRESENTATIVE_OFFSET..BALANCE_OFFSET].copy_from_slice(block.representative.as_bytes());
    out[BALANCE_OFFSET..LINK_OFFSET].copy_from_slice(&block.balance.to_be_bytes());
    out[LINK_OFFSET..SIGNATURE_OFFSET].copy_from_slice(block.link.as_bytes());
    out[SIGNATURE_OFFSET..WORK_OFFSET].copy_from_slice(block.signature.as_bytes());
    out[WORK_OFFSET..].copy_from_slice(&block.work.to_be_bytes());
    EncodedBlock(out)
}

pub fn decode(bytes: &[u8]) -> Result<StateBlock, EncodingError> {
    if bytes.len() != ENCODED_BLOCK_SIZE {
        return Err(EncodingError::InvalidLength {
            expected: ENCODED_BLOCK_SIZE,
            got: bytes.len(),
        });
    }

    Ok(StateBlock {
        account: PublicKey::from_bytes(read_array::<PUBLIC_KEY_SIZE>(bytes, ACCOUNT_OFFSET)),
        previous: Hash::new(read_array::<HASH_SIZE>(bytes, PREVIOUS_OFFSET)),
        representative: PublicKey::from_bytes(read_array::<PUBLIC_KEY_SIZE>(
            bytes,
            REPRESENTATIVE_OFFSET,
        )),
        balance: Raw::from_be_bytes(read_array::<BALANCE_SIZE>(bytes, BALANCE_OFFSET)),
        link: Hash::new(read_array::<HASH_SIZE>(bytes, LINK_OFFSET)),
        signature: Signature::from_bytes(read_array::<SIGNATURE_SIZE>(bytes, SIGNATURE_OFFSET)),
        work: Work::new(u64::from_be_bytes(read_array::<WORK_SIZE>(bytes, WORK_OFFSET))),
    })
}

// Length was checked by the caller
fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
