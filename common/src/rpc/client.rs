use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, trace};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::*;
use crate::{
    block::{Raw, StateBlock, Work},
    crypto::{Address, Hash},
    network::difficulty_to_hex,
};

const ACCOUNT_NOT_FOUND: &str = "Account not found";

/// Timeouts applied to every RPC request
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// JSON over HTTP POST client for a node RPC endpoint or a work server.
///
/// No retry is attempted, a failed call is returned to the caller as is.
#[derive(Clone, Debug)]
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Self::with_config(url, RpcClientConfig::default())
    }

    pub fn with_config(url: &str, config: RpcClientConfig) -> Result<Self, RpcError> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)
        } else {
            Url::parse(&format!("http://{}", url))
        }
        .map_err(|_| RpcError::InvalidUrl(url.to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                action: "connect",
                reason: e.to_string(),
            })?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<R: Serialize + Sync, T: DeserializeOwned>(
        &self,
        action: &'static str,
        request: &R,
    ) -> Result<T, RpcError> {
        let transport = |e: reqwest::Error| RpcError::Transport {
            action,
            reason: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            },
        };

        trace!("Sending '{}' to {}", action, self.url);
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        let value: Option<Value> = serde_json::from_str(&body).ok();
        let node_error = value
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if !status.is_success() {
            return Err(RpcError::Status {
                action,
                status: status.as_u16(),
                message: node_error
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string()),
            });
        }

        if let Some(message) = node_error {
            debug!("Node returned an error for '{}': {}", action, message);
            return Err(RpcError::Node { action, message });
        }

        let value = value.ok_or_else(|| RpcError::invalid_response(action, "body is not JSON"))?;
        serde_json::from_value(value).map_err(|e| RpcError::invalid_response(action, e))
    }
}

#[async_trait]
impl LedgerRpc for RpcClient {
    async fn account_info(&self, account: &Address) -> Result<AccountInfo, RpcError> {
        match self
            .request("account_info", &AccountInfoRequest::new(account))
            .await
        {
            Err(RpcError::Node { message, .. }) if message == ACCOUNT_NOT_FOUND => {
                Err(RpcError::AccountNotFound(account.to_string()))
            }
            result => result,
        }
    }

    async fn accounts_frontiers(
        &self,
        accounts: &[Address],
    ) -> Result<IndexMap<Address, Option<Hash>>, RpcError> {
        let response: AccountsFrontiersResponse = self
            .request("accounts_frontiers", &AccountsFrontiersRequest::new(accounts))
            .await?;
        response.resolve(accounts)
    }

    async fn receivable(
        &self,
        account: &Address,
        threshold: Raw,
    ) -> Result<IndexMap<Hash, Raw>, RpcError> {
        let response: ReceivableResponse = self
            .request("receivable", &ReceivableRequest::new(account, threshold))
            .await?;
        response.amounts()
    }

    async fn blocks_info(&self, hashes: &[Hash]) -> Result<IndexMap<Hash, BlockInfo>, RpcError> {
        let response: BlocksInfoResponse = self
            .request("blocks_info", &BlocksInfoRequest::new(hashes))
            .await?;
        if !response.blocks_not_found.is_empty() {
            debug!("{} blocks not found by the node", response.blocks_not_found.len());
        }
        Ok(response.blocks)
    }

    async fn process(
        &self,
        block: &StateBlock,
        subtype: Option<BlockSubtype>,
        async_submit: bool,
    ) -> Result<Option<Hash>, RpcError> {
        let response: ProcessResponse = self
            .request("process", &ProcessRequest::new(block, subtype, async_submit))
            .await?;
        if response.hash.is_none() && response.started.is_none() {
            return Err(RpcError::invalid_response("process", "neither hash nor started"));
        }
        Ok(response.hash)
    }
}

#[async_trait]
impl WorkProvider for RpcClient {
    async fn work_generate(&self, root: &Hash, difficulty: u64) -> Result<Work, RpcError> {
        let request = WorkGenerateRequest::new(*root, Some(difficulty_to_hex(difficulty)));
        let response: WorkGenerateResponse = self.request("work_generate", &request).await?;
        Ok(response.work)
    }
}
