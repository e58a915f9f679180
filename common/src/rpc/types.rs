use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::RpcError;
use crate::{
    block::{Raw, StateBlock, Work},
    crypto::{Address, Hash},
};

// Balances and amounts travel as decimal strings
pub mod raw_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::block::Raw;

    pub fn serialize<S: Serializer>(value: &Raw, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Raw, D::Error> {
        let value = String::deserialize(deserializer)?;
        value
            .parse::<Raw>()
            .map_err(|_| D::Error::custom(format!("invalid raw amount '{}'", value)))
    }
}

mod optional_raw_string {
    use serde::{de::Error, Deserialize, Deserializer};

    use crate::block::Raw;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Raw>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(value) => value
                .parse::<Raw>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid raw amount '{}'", value))),
            None => Ok(None),
        }
    }
}

/// Block subtype hint accepted by `process`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockSubtype {
    Send,
    Receive,
    Open,
    Change,
}

// ============================================================================
// account_info
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AccountInfoRequest<'a> {
    pub action: &'static str,
    pub account: &'a Address,
    pub representative: bool,
}

impl<'a> AccountInfoRequest<'a> {
    pub fn new(account: &'a Address) -> Self {
        Self {
            action: "account_info",
            account,
            representative: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AccountInfo {
    pub frontier: Hash,
    #[serde(with = "raw_string")]
    pub balance: Raw,
    #[serde(default)]
    pub representative: Option<Address>,
    #[serde(default)]
    pub block_count: Option<String>,
}

// ============================================================================
// accounts_frontiers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AccountsFrontiersRequest<'a> {
    pub action: &'static str,
    pub accounts: &'a [Address],
}

impl<'a> AccountsFrontiersRequest<'a> {
    pub fn new(accounts: &'a [Address]) -> Self {
        Self {
            action: "accounts_frontiers",
            accounts,
        }
    }
}

/// Raw `accounts_frontiers` reply.
///
/// Older nodes report unknown accounts inline as `"error: Account not found"`
/// values, newer ones move them to a separate `errors` map.
#[derive(Debug, Deserialize)]
pub struct AccountsFrontiersResponse {
    #[serde(default, deserialize_with = "empty_string_as_default")]
    pub frontiers: IndexMap<String, String>,
    #[serde(default, deserialize_with = "empty_string_as_default")]
    pub errors: IndexMap<String, String>,
}

impl AccountsFrontiersResponse {
    /// Frontier of every requested account, `None` when it is unopened.
    pub fn resolve(
        &self,
        accounts: &[Address],
    ) -> Result<IndexMap<Address, Option<Hash>>, RpcError> {
        let mut result = IndexMap::with_capacity(accounts.len());
        for account in accounts {
            let key = account.to_string();
            let frontier = match self.frontiers.get(&key) {
                Some(value) if value.starts_with("error") => None,
                Some(value) => Some(
                    Hash::from_hex(value)
                        .map_err(|e| RpcError::invalid_response("accounts_frontiers", e))?,
                ),
                None => None,
            };
            result.insert(*account, frontier);
        }
        Ok(result)
    }
}

// ============================================================================
// receivable
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReceivableRequest<'a> {
    pub action: &'static str,
    pub account: &'a Address,
    #[serde(with = "raw_string")]
    pub threshold: Raw,
}

impl<'a> ReceivableRequest<'a> {
    pub fn new(account: &'a Address, threshold: Raw) -> Self {
        Self {
            action: "receivable",
            account,
            threshold,
        }
    }
}

/// With a threshold set, `receivable` maps each send hash to its amount.
/// Nodes answer an empty string instead of an empty map.
#[derive(Debug, Deserialize)]
pub struct ReceivableResponse {
    #[serde(default, deserialize_with = "empty_string_as_default")]
    pub blocks: IndexMap<Hash, String>,
}

impl ReceivableResponse {
    pub fn amounts(self) -> Result<IndexMap<Hash, Raw>, RpcError> {
        self.blocks
            .into_iter()
            .map(|(hash, amount)| {
                amount
                    .parse::<Raw>()
                    .map(|amount| (hash, amount))
                    .map_err(|_| {
                        RpcError::invalid_response("receivable", format!("invalid amount '{}'", amount))
                    })
            })
            .collect()
    }
}

// ============================================================================
// blocks_info
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BlocksInfoRequest<'a> {
    pub action: &'static str,
    pub hashes: &'a [Hash],
    pub json_block: bool,
    pub include_not_found: bool,
}

impl<'a> BlocksInfoRequest<'a> {
    pub fn new(hashes: &'a [Hash]) -> Self {
        Self {
            action: "blocks_info",
            hashes,
            json_block: true,
            include_not_found: true,
        }
    }
}

// Only the fields the benchmark reads, legacy blocks may lack most of them
#[derive(Clone, Debug, Deserialize)]
pub struct BlockContents {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub representative: Option<Address>,
    #[serde(default, deserialize_with = "optional_raw_string::deserialize")]
    pub balance: Option<Raw>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BlockInfo {
    pub block_account: Address,
    #[serde(default, deserialize_with = "optional_raw_string::deserialize")]
    pub amount: Option<Raw>,
    #[serde(with = "raw_string")]
    pub balance: Raw,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    pub contents: BlockContents,
}

#[derive(Debug, Deserialize)]
pub struct BlocksInfoResponse {
    #[serde(default, deserialize_with = "empty_string_as_default")]
    pub blocks: IndexMap<Hash, BlockInfo>,
    #[serde(default)]
    pub blocks_not_found: Vec<Hash>,
}

// ============================================================================
// process
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProcessRequest<'a> {
    pub action: &'static str,
    pub json_block: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<BlockSubtype>,
    #[serde(rename = "async")]
    pub async_submit: bool,
    pub block: &'a StateBlock,
}

impl<'a> ProcessRequest<'a> {
    pub fn new(block: &'a StateBlock, subtype: Option<BlockSubtype>, async_submit: bool) -> Self {
        Self {
            action: "process",
            json_block: true,
            subtype,
            async_submit,
            block,
        }
    }
}

/// Synchronous submissions return the block hash, asynchronous ones only
/// acknowledge with `started`.
#[derive(Debug, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub hash: Option<Hash>,
    #[serde(default)]
    pub started: Option<String>,
}

// ============================================================================
// work_generate
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WorkGenerateRequest {
    pub action: &'static str,
    pub hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl WorkGenerateRequest {
    pub fn new(hash: Hash, difficulty: Option<String>) -> Self {
        Self {
            action: "work_generate",
            hash,
            difficulty,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkGenerateResponse {
    pub work: Work,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub multiplier: Option<String>,
}

// Nodes render empty collections as ""
fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeEmpty<T> {
        Value(T),
        Empty(String),
    }

    match MaybeEmpty::<T>::deserialize(deserializer)? {
        MaybeEmpty::Value(value) => Ok(value),
        MaybeEmpty::Empty(value) if value.is_empty() => Ok(T::default()),
        MaybeEmpty::Empty(value) => Err(serde::de::Error::custom(format!(
            "unexpected string '{}'",
            value
        ))),
    }
}
