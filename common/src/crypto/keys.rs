//! Ed25519 key material as used by Nano.
//!
//! Nano signs with ed25519 but replaces sha-512 by blake2b-512 both for the
//! secret key expansion and for the signing transcript, so the standard
//! `SigningKey` API cannot be used. Keys are expanded through the dalek
//! hazmat API with the blake2b digest instead.

use blake2::{Blake2b512, Digest};
use ed25519_dalek::{
    hazmat::{raw_sign, ExpandedSecretKey},
    Signature as DalekSignature, VerifyingKey,
};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use super::{Blake2b256, CryptoError, Hash, HASH_SIZE};

/// Size of a private key in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of a public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Seed from which all benchmark accounts are derived.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; HASH_SIZE]>);

impl Seed {
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let hash = Hash::from_hex(value.trim())?;
        Ok(Self::from_bytes(hash.to_bytes()))
    }

    /// Derive the private key of the account at `index`.
    ///
    /// private = blake2b-256(seed || index as u32 big endian)
    pub fn derive_private_key(&self, index: u32) -> PrivateKey {
        let mut hasher = Blake2b256::new();
        hasher.update(self.0.as_slice());
        hasher.update(index.to_be_bytes());
        let bytes: [u8; PRIVATE_KEY_SIZE] = hasher.finalize().into();
        PrivateKey::from_bytes(bytes)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Private key (32 bytes), zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<[u8; PRIVATE_KEY_SIZE]>);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_bytes(Hash::from_hex(value)?.to_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0.as_slice())
    }

    // Expand the key the way Nano does: blake2b-512 of the raw key,
    // lower half clamped into the scalar, upper half used as nonce prefix
    fn expand(&self) -> ExpandedSecretKey {
        let digest = Blake2b512::digest(self.0.as_slice());
        let mut bytes = Zeroizing::new([0u8; 64]);
        bytes.copy_from_slice(&digest);
        ExpandedSecretKey::from_bytes(&bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Public key (32 bytes). Also the binary form of an account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        Ok(Self(Hash::from_hex(value)?.to_bytes()))
    }

    // Work root and link fields carry public keys as plain 32 bytes values
    pub fn as_hash(&self) -> Hash {
        Hash::new(self.0)
    }
}

impl From<Hash> for PublicKey {
    fn from(hash: Hash) -> Self {
        Self(hash.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Ed25519-blake2b signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0; SIGNATURE_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidLength {
                len: bytes.len(),
                expected: SIGNATURE_SIZE,
            });
        }
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Signature {
    fn deserialize<D: serde::Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Signature::from_hex(&hex).map_err(SerdeError::custom)
    }
}

/// Signing key pair of an account.
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let expanded = private_key.expand();
        let verifying = VerifyingKey::from(&expanded);
        Self {
            private_key,
            public_key: PublicKey(verifying.to_bytes()),
        }
    }

    // Fresh random identity, used for the P2P node id
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::from_bytes(rand::random()))
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let expanded = self.private_key.expand();
        // The verifying key is re-derived from the expanded key so the
        // transcript always uses the matching public key
        let verifying = VerifyingKey::from(&expanded);
        let signature: DalekSignature = raw_sign::<Blake2b512>(&expanded, message, &verifying);
        Signature(signature.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::hazmat::raw_verify;

    const ZERO_SEED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_zero_seed_derivation_vector() {
        let seed = Seed::from_hex(ZERO_SEED).unwrap();
        let private_key = seed.derive_private_key(0);
        assert_eq!(
            private_key.to_hex(),
            "9F0E444C69F77A49BD0BE89DB92C38FE713E0963165CCA12FAF5712D7657120F"
        );

        let keypair = KeyPair::from_private_key(private_key);
        assert_eq!(
            keypair.public_key().to_hex(),
            "C008B814A7D269A1FA3C6528B19201A24D797912DB9996FF02A1FF356E45552B"
        );
    }

    #[test]
    fn test_derivation_depends_on_index() {
        let seed = Seed::from_bytes([7u8; 32]);
        let a = seed.derive_private_key(1);
        let b = seed.derive_private_key(2);
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes(), seed.derive_private_key(1).as_bytes());
    }

    #[test]
    fn test_signature_verifies_with_blake2b_transcript() {
        let keypair = KeyPair::from_private_key(Seed::from_bytes([1u8; 32]).derive_private_key(3));
        let message = [42u8; 32];
        let signature = keypair.sign(&message);

        // Deterministic
        assert_eq!(signature, keypair.sign(&message));

        let verifying = VerifyingKey::from_bytes(keypair.public_key().as_bytes()).unwrap();
        let dalek = DalekSignature::from_bytes(signature.as_bytes());
        assert!(raw_verify::<Blake2b512>(&verifying, &message, &dalek).is_ok());
        assert!(raw_verify::<Blake2b512>(&verifying, &[0u8; 32], &dalek).is_err());
    }

    #[test]
    fn test_seed_debug_is_redacted() {
        let seed = Seed::from_bytes([9u8; 32]);
        assert!(!format!("{:?}", seed).contains("09"));
    }
}
