mod codec;
mod error;
mod work;

pub use codec::*;
pub use error::EncodingError;
pub use work::*;

use blake2::Digest;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::crypto::{Address, Blake2b256, Hash, KeyPair, PublicKey, Signature};

/// Balances are expressed in raw, the smallest ledger unit.
pub type Raw = u128;

// State blocks hash a 32 bytes preamble holding the block type
const STATE_BLOCK_PREAMBLE: [u8; 32] = {
    let mut preamble = [0u8; 32];
    preamble[31] = 6;
    preamble
};

const STATE_BLOCK_TYPE: &str = "state";

/// Universal (state) block of an account chain.
///
/// Open, send, receive and representative changes are all state blocks,
/// the subtype is only implied by the balance delta and the link field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "JsonBlock", try_from = "JsonBlock")]
pub struct StateBlock {
    pub account: PublicKey,
    pub previous: Hash,
    pub representative: PublicKey,
    pub balance: Raw,
    pub link: Hash,
    pub signature: Signature,
    pub work: Work,
}

impl StateBlock {
    /// Unsigned block moving `amount` out of the account towards `destination`.
    pub fn send(
        account: PublicKey,
        previous: Hash,
        representative: PublicKey,
        balance_after: Raw,
        destination: &PublicKey,
    ) -> Self {
        Self::unsigned(account, previous, representative, balance_after, destination.as_hash())
    }

    /// Unsigned block pocketing the send `source`. With a zero `previous`
    /// this is the open block of the account.
    pub fn receive(
        account: PublicKey,
        previous: Hash,
        representative: PublicKey,
        balance_after: Raw,
        source: Hash,
    ) -> Self {
        Self::unsigned(account, previous, representative, balance_after, source)
    }

    /// Unsigned block only rotating the representative.
    pub fn change(account: PublicKey, previous: Hash, representative: PublicKey, balance: Raw) -> Self {
        Self::unsigned(account, previous, representative, balance, Hash::zero())
    }

    fn unsigned(
        account: PublicKey,
        previous: Hash,
        representative: PublicKey,
        balance: Raw,
        link: Hash,
    ) -> Self {
        Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature: Signature::zero(),
            work: Work::default(),
        }
    }

    /// Block hash, the identifier used for confirmations and as `previous`
    /// of the next block in the chain.
    pub fn hash(&self) -> Hash {
        let mut hasher = Blake2b256::new();
        hasher.update(STATE_BLOCK_PREAMBLE);
        hasher.update(self.account.as_bytes());
        hasher.update(self.previous.as_bytes());
        hasher.update(self.representative.as_bytes());
        hasher.update(self.balance.to_be_bytes());
        hasher.update(self.link.as_bytes());
        Hash::new(hasher.finalize().into())
    }

    // First block of an account chain
    pub fn is_open(&self) -> bool {
        self.previous.is_zero()
    }

    // Value the proof of work must be computed against
    pub fn work_root(&self) -> Hash {
        if self.is_open() {
            self.account.as_hash()
        } else {
            self.previous
        }
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        self.signature = keypair.sign(self.hash().as_bytes());
    }

    pub fn with_work(mut self, work: Work) -> Self {
        self.work = work;
        self
    }

    pub fn encode(&self) -> EncodedBlock {
        encode(self)
    }
}

/// JSON rendering used by the node RPC (`json_block: true`) and the cache file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub account: String,
    pub previous: String,
    pub representative: String,
    pub balance: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_as_account: Option<String>,
    pub signature: String,
    pub work: String,
}

impl From<StateBlock> for JsonBlock {
    fn from(block: StateBlock) -> Self {
        Self {
            kind: STATE_BLOCK_TYPE.to_string(),
            account: Address::new(block.account).to_string(),
            previous: block.previous.to_hex(),
            representative: Address::new(block.representative).to_string(),
            balance: block.balance.to_string(),
            link: block.link.to_hex(),
            link_as_account: Some(Address::from_hash(&block.link).to_string()),
            signature: block.signature.to_hex(),
            work: block.work.to_hex(),
        }
    }
}

impl TryFrom<JsonBlock> for StateBlock {
    type Error = EncodingError;

    fn try_from(json: JsonBlock) -> Result<Self, Self::Error> {
        if json.kind != STATE_BLOCK_TYPE {
            return Err(EncodingError::UnsupportedType(json.kind));
        }

        let account = Address::from_str(&json.account)
            .map_err(|e| EncodingError::field("account", e))?
            .to_public_key();
        let representative = Address::from_str(&json.representative)
            .map_err(|e| EncodingError::field("representative", e))?
            .to_public_key();
        let previous =
            Hash::from_hex(&json.previous).map_err(|e| EncodingError::field("previous", e))?;
        let link = Hash::from_hex(&json.link).map_err(|e| EncodingError::field("link", e))?;
        let balance = json
            .balance
            .parse::<Raw>()
            .map_err(|_| EncodingError::InvalidBalance(json.balance.clone()))?;
        let signature = Signature::from_hex(&json.signature)
            .map_err(|e| EncodingError::field("signature", e))?;
        let work = Work::from_hex(&json.work)?;

        Ok(Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature,
            work,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Seed;

    fn keypair() -> KeyPair {
        KeyPair::from_private_key(Seed::from_bytes([2u8; 32]).derive_private_key(1))
    }

    #[test]
    fn test_hash_covers_every_hashed_field() {
        let kp = keypair();
        let base = StateBlock::change(*kp.public_key(), Hash::new([1; 32]), PublicKey::from_bytes([2; 32]), 10);
        let hash = base.hash();

        let mut other = base.clone();
        other.balance += 1;
        assert_ne!(other.hash(), hash);

        let mut other = base.clone();
        other.link = Hash::new([9; 32]);
        assert_ne!(other.hash(), hash);

        // Signature and work are not part of the hash
        let mut other = base.clone();
        other.sign(&kp);
        other.work = Work::new(7);
        assert_eq!(other.hash(), hash);
    }

    #[test]
    fn test_work_root() {
        let kp = keypair();
        let open = StateBlock::receive(*kp.public_key(), Hash::zero(), *kp.public_key(), 1, Hash::new([4; 32]));
        assert!(open.is_open());
        assert_eq!(open.work_root(), kp.public_key().as_hash());

        let change = StateBlock::change(*kp.public_key(), Hash::new([4; 32]), *kp.public_key(), 1);
        assert_eq!(change.work_root(), Hash::new([4; 32]));
    }

    #[test]
    fn test_json_round_trip() {
        let kp = keypair();
        let mut block = StateBlock::send(
            *kp.public_key(),
            Hash::new([3; 32]),
            *kp.public_key(),
            u128::MAX - 5,
            &PublicKey::from_bytes([8; 32]),
        );
        block.sign(&kp);
        let block = block.with_work(Work::new(0xdeadbeef));

        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["balance"], (u128::MAX - 5).to_string());
        assert_eq!(json["work"], "00000000deadbeef");
        assert!(json["account"].as_str().unwrap().starts_with("nano_"));

        let back: StateBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_json_rejects_bad_fields() {
        let kp = keypair();
        let block = StateBlock::change(*kp.public_key(), Hash::new([3; 32]), *kp.public_key(), 1);
        let mut json: JsonBlock = block.into();
        json.balance = "-1".to_string();
        assert!(matches!(
            StateBlock::try_from(json.clone()),
            Err(EncodingError::InvalidBalance(_))
        ));

        json.balance = "1".to_string();
        json.previous = "XYZ".to_string();
        assert!(matches!(
            StateBlock::try_from(json.clone()),
            Err(EncodingError::InvalidField { field: "previous", .. })
        ));

        json.previous = Hash::zero().to_hex();
        json.kind = "send".to_string();
        assert!(matches!(
            StateBlock::try_from(json),
            Err(EncodingError::UnsupportedType(_))
        ));
    }
}
