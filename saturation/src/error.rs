use nano_common::{block::{EncodingError, Raw}, rpc::RpcError};
use std::time::Duration;
use strum::Display;
use thiserror::Error;

/// Pipeline stage an error was raised in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Configuration,
    Provisioning,
    Generation,
    Cache,
    Broadcast,
    Tracking,
    Reporting,
}

#[derive(Error, Debug)]
pub enum BenchmarkError {
    /// Missing or malformed endpoint, seed or option
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node RPC or work server call failed
    #[error("RPC error during {stage} ({context}): {source}")]
    Rpc {
        stage: Stage,
        context: String,
        #[source]
        source: RpcError,
    },

    /// Main account cannot fund the run
    #[error("Insufficient funds in {account}: balance is {balance} raw, at least {required} raw required")]
    InsufficientFunds {
        account: String,
        balance: Raw,
        required: Raw,
    },

    /// Main account unopened or a ledger answer inconsistent with local state
    #[error("Account state error for {account}: {reason}")]
    AccountState { account: String, reason: String },

    /// Malformed hex or length mismatch while building wire bytes
    #[error("Encoding error for {context}: {source}")]
    Encoding {
        context: String,
        #[source]
        source: EncodingError,
    },

    /// No peer or notification transport reachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Overall run exceeded the operator supplied timeout
    #[error("Run exceeded its timeout of {0:?}")]
    Timeout(Duration),

    /// Cache or result log I/O
    #[error("Storage error on '{path}': {reason}")]
    Storage { path: String, reason: String },

    /// A worker task died without reporting its result
    #[error("Worker failure during {stage}: {reason}")]
    Worker { stage: Stage, reason: String },
}

impl BenchmarkError {
    pub fn rpc(stage: Stage, context: impl ToString, source: RpcError) -> Self {
        Self::Rpc {
            stage,
            context: context.to_string(),
            source,
        }
    }

    pub fn account_state(account: impl ToString, reason: impl ToString) -> Self {
        Self::AccountState {
            account: account.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code, one per error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Rpc { .. } => 3,
            Self::InsufficientFunds { .. } => 4,
            Self::AccountState { .. } => 5,
            Self::Encoding { .. } => 6,
            Self::Connectivity(_) => 7,
            Self::Timeout(_) => 8,
            Self::Storage { .. } => 9,
            Self::Worker { .. } => 10,
        }
    }
}
