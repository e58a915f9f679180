mod client;
mod error;
mod types;

pub use client::*;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    block::{Raw, StateBlock, Work},
    crypto::{Address, Hash},
};

/// Node RPC actions used by the benchmark.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fails with `RpcError::AccountNotFound` when the account is unopened.
    async fn account_info(&self, account: &Address) -> Result<AccountInfo, RpcError>;

    /// Frontier per requested account, `None` for unopened accounts.
    async fn accounts_frontiers(
        &self,
        accounts: &[Address],
    ) -> Result<IndexMap<Address, Option<Hash>>, RpcError>;

    /// Receivable sends towards `account` of at least `threshold` raw.
    async fn receivable(
        &self,
        account: &Address,
        threshold: Raw,
    ) -> Result<IndexMap<Hash, Raw>, RpcError>;

    /// Blocks the node does not know are left out of the result.
    async fn blocks_info(&self, hashes: &[Hash]) -> Result<IndexMap<Hash, BlockInfo>, RpcError>;

    /// Submit a block. Returns its hash, or `None` for an asynchronous
    /// submission which is only acknowledged.
    async fn process(
        &self,
        block: &StateBlock,
        subtype: Option<BlockSubtype>,
        async_submit: bool,
    ) -> Result<Option<Hash>, RpcError>;
}

/// Remote proof-of-work generation.
#[async_trait]
pub trait WorkProvider: Send + Sync {
    async fn work_generate(&self, root: &Hash, difficulty: u64) -> Result<Work, RpcError>;
}
