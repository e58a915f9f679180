use clap::Parser;
use log::info;
use nano_common::{
    block::Raw,
    crypto::Seed,
    logger::LogConfig,
    network::{difficulty_from_hex, Network},
    p2p::PeerAddress,
    rpc::raw_string,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use strum::{Display, EnumString};
use url::Url;

use crate::error::BenchmarkError;

/// Default values for configuration
pub mod defaults {
    use super::*;

    pub const RPC_URL: &str = "http://localhost:7076";
    pub const WS_URL: &str = "ws://localhost:7078";
    pub const ACCOUNT_COUNT: u32 = 5000;

    pub const CACHE_PATH: &str = "benchmark-cache.json";
    pub const RESULTS_PATH: &str = "benchmark-results.json";

    // Waiting time for peer handshakes before broadcasting
    pub const PEER_GRACE_PERIOD_MS: u64 = 5000;
    pub const SUBSCRIBE_TIMEOUT_MS: u64 = 5000;

    // 1 Nano
    pub const MIN_MAIN_BALANCE: Raw = 10u128.pow(30);
    // Sent from the main account to open each benchmark account
    pub const OPEN_AMOUNT: Raw = 10u128.pow(26);
    pub const SPAM_AMOUNT: Raw = 1;

    // Public beta network nodes
    pub const BETA_PEERS: [(&str, u16); 2] = [
        ("::ffff:116.202.107.97", 54000),
        ("::ffff:194.146.12.171", 54000),
    ];
}

/// Block generated for every benchmark account
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockKind {
    /// Rotate the representative, balance unchanged
    #[default]
    Change,
    /// Send a tiny amount back to the main account
    Send,
}

/// How confirmation events are counted towards completion
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CountingMode {
    /// Every confirmation event counts
    Aggregate,
    /// Only the first confirmation of each generated hash counts
    #[default]
    Distinct,
}

fn default_rpc_url() -> String {
    defaults::RPC_URL.to_string()
}
fn default_ws_url() -> String {
    defaults::WS_URL.to_string()
}
fn default_account_count() -> u32 {
    defaults::ACCOUNT_COUNT
}
fn default_cache_path() -> String {
    defaults::CACHE_PATH.to_string()
}
fn default_results_path() -> String {
    defaults::RESULTS_PATH.to_string()
}
fn default_peer_grace_period_ms() -> u64 {
    defaults::PEER_GRACE_PERIOD_MS
}
fn default_subscribe_timeout_ms() -> u64 {
    defaults::SUBSCRIBE_TIMEOUT_MS
}
fn default_min_main_balance() -> Raw {
    defaults::MIN_MAIN_BALANCE
}
fn default_open_amount() -> Raw {
    defaults::OPEN_AMOUNT
}
fn default_spam_amount() -> Raw {
    defaults::SPAM_AMOUNT
}

/// Benchmark options, from the command line or a JSON config file
#[derive(Clone, Debug, clap::Args, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Seed of the benchmark accounts (64 hex chars), index 0 is the funded main account
    #[clap(long, env = "NANO_SEED", hide_env_values = true)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    /// Node RPC endpoint
    #[clap(long, default_value_t = default_rpc_url())]
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Node websocket endpoint
    #[clap(long, default_value_t = default_ws_url())]
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Work server endpoint
    /// By default, work is requested from the node RPC
    #[clap(long)]
    #[serde(default)]
    pub work_url: Option<String>,
    /// Number of benchmark accounts, excluding the main account
    #[clap(long, default_value_t = default_account_count())]
    #[serde(default = "default_account_count")]
    pub count: u32,
    /// Abort the run after this many milliseconds
    #[clap(long)]
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Network the node runs on
    #[clap(long, value_enum, default_value_t)]
    #[serde(default)]
    pub network: Network,
    /// Override the network work threshold of generated blocks (16 hex digits)
    #[clap(long)]
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Number of concurrent block generation workers
    /// By default, the number of available CPU cores
    #[clap(long)]
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Peer to publish blocks to, as host:port (repeatable)
    /// By default, the public beta nodes when running on beta
    #[clap(long = "peer")]
    #[serde(default)]
    pub peers: Vec<PeerAddress>,
    /// Kind of block generated for every account
    #[clap(long, value_enum, default_value_t)]
    #[serde(default)]
    pub block_kind: BlockKind,
    /// How confirmations are counted
    #[clap(long, value_enum, default_value_t)]
    #[serde(default)]
    pub counting_mode: CountingMode,
    /// Also subscribe to stopped elections and report their count
    #[clap(long)]
    #[serde(default)]
    pub track_dropped: bool,
    /// Only provision the benchmark accounts, then exit
    #[clap(long)]
    #[serde(default)]
    pub setup: bool,
    /// Wait for the node to process each provisioning block instead of
    /// submitting asynchronously
    #[clap(long)]
    #[serde(default)]
    pub sync_submit: bool,
    /// Cache file of generated blocks
    #[clap(long, default_value_t = default_cache_path())]
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// Append-only results log
    #[clap(long, default_value_t = default_results_path())]
    #[serde(default = "default_results_path")]
    pub results_path: String,
    /// Time allowed for peer handshakes, in milliseconds
    #[clap(long, default_value_t = default_peer_grace_period_ms())]
    #[serde(default = "default_peer_grace_period_ms")]
    pub peer_grace_period_ms: u64,
    /// Time allowed for the node to acknowledge a subscription, in milliseconds
    #[clap(long, default_value_t = default_subscribe_timeout_ms())]
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    /// Minimum main account balance in raw
    #[clap(long, default_value_t = default_min_main_balance())]
    #[serde(default = "default_min_main_balance", with = "raw_string")]
    pub min_main_balance: Raw,
    /// Amount sent to open each benchmark account, in raw
    #[clap(long, default_value_t = default_open_amount())]
    #[serde(default = "default_open_amount", with = "raw_string")]
    pub open_amount: Raw,
    /// Amount of send blocks, in raw
    #[clap(long, default_value_t = default_spam_amount())]
    #[serde(default = "default_spam_amount", with = "raw_string")]
    pub spam_amount: Raw,
    #[clap(flatten)]
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            seed: None,
            rpc_url: default_rpc_url(),
            ws_url: default_ws_url(),
            work_url: None,
            count: default_account_count(),
            timeout: None,
            network: Network::default(),
            difficulty: None,
            concurrency: None,
            peers: Vec::new(),
            block_kind: BlockKind::default(),
            counting_mode: CountingMode::default(),
            track_dropped: false,
            setup: false,
            sync_submit: false,
            cache_path: default_cache_path(),
            results_path: default_results_path(),
            peer_grace_period_ms: default_peer_grace_period_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            min_main_balance: default_min_main_balance(),
            open_amount: default_open_amount(),
            spam_amount: default_spam_amount(),
            log: LogConfig::default(),
        }
    }
}

/// Nano network saturation benchmark
#[derive(Parser, Clone, Debug)]
#[command(name = "nano-saturation")]
#[command(about = "Measure how fast a Nano network broadcasts and confirms a batch of blocks")]
#[command(styles = nano_common::get_cli_styles())]
pub struct CliConfig {
    #[clap(flatten)]
    pub config: BenchmarkConfig,

    /// JSON File to load the configuration from
    #[clap(long)]
    pub config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    pub generate_config_template: bool,
}

impl CliConfig {
    /// Configuration to run with: the config file when one is given, else the
    /// command line. A seed from the command line or environment always wins.
    pub fn resolve(self) -> Result<BenchmarkConfig, BenchmarkError> {
        match self.config_file {
            Some(path) => {
                let mut config = BenchmarkConfig::from_file(&path)?;
                if self.config.seed.is_some() {
                    config.seed = self.config.seed;
                }
                Ok(config)
            }
            None => Ok(self.config),
        }
    }
}

impl BenchmarkConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BenchmarkError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchmarkError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BenchmarkError::Configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default configuration, without any seed
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<(), BenchmarkError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&BenchmarkConfig::default())
            .map_err(|e| BenchmarkError::storage(path, e))?;
        std::fs::write(path, content).map_err(|e| BenchmarkError::storage(path, e))?;
        info!("Configuration template written to {}", path.display());
        Ok(())
    }

    /// Check every option and resolve defaults that depend on the network.
    pub fn validate(&self) -> Result<BenchmarkSettings, BenchmarkError> {
        let seed = match &self.seed {
            Some(seed) => Seed::from_hex(seed)
                .map_err(|e| BenchmarkError::Configuration(format!("Invalid seed: {}", e)))?,
            None => {
                return Err(BenchmarkError::Configuration(
                    "Missing seed, use --seed or NANO_SEED".to_string(),
                ))
            }
        };

        let rpc_url = validate_http_url("rpc_url", &self.rpc_url)?;
        let work_url = match &self.work_url {
            Some(url) => validate_http_url("work_url", url)?,
            None => rpc_url.clone(),
        };

        let ws_url = Url::parse(&self.ws_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "ws" | "wss"))
            .ok_or_else(|| {
                BenchmarkError::Configuration(format!(
                    "Invalid ws_url '{}': expected a ws:// or wss:// URL",
                    self.ws_url
                ))
            })?;

        if self.count == 0 || self.count == u32::MAX {
            return Err(BenchmarkError::Configuration(format!(
                "Invalid count {}: at least one benchmark account is required",
                self.count
            )));
        }

        let concurrency = self.concurrency.unwrap_or_else(num_cpus::get);
        if concurrency == 0 {
            return Err(BenchmarkError::Configuration(
                "Invalid concurrency 0: at least one worker is required".to_string(),
            ));
        }

        let timeout = match self.timeout {
            Some(0) => {
                return Err(BenchmarkError::Configuration(
                    "Invalid timeout 0 ms".to_string(),
                ))
            }
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        let send_difficulty = match &self.difficulty {
            Some(value) => difficulty_from_hex(value).map_err(|_| {
                BenchmarkError::Configuration(format!("Invalid difficulty '{}'", value))
            })?,
            None => self.network.send_threshold(),
        };

        let peers = if self.peers.is_empty() {
            match self.network {
                Network::Beta => defaults::BETA_PEERS
                    .iter()
                    .map(|(address, port)| PeerAddress::new(*address, *port))
                    .collect(),
                network if !self.setup => {
                    return Err(BenchmarkError::Configuration(format!(
                        "No peer configured for network {}, use --peer",
                        network
                    )))
                }
                _ => Vec::new(),
            }
        } else {
            self.peers.clone()
        };

        if self.open_amount == 0 {
            return Err(BenchmarkError::Configuration(
                "Invalid open_amount 0".to_string(),
            ));
        }
        if self.block_kind == BlockKind::Send && self.spam_amount == 0 {
            return Err(BenchmarkError::Configuration(
                "Invalid spam_amount 0 for send blocks".to_string(),
            ));
        }

        Ok(BenchmarkSettings {
            seed,
            rpc_url,
            work_url,
            ws_url,
            account_count: self.count,
            timeout,
            network: self.network,
            send_difficulty,
            receive_difficulty: self.network.receive_threshold(),
            concurrency,
            peers,
            block_kind: self.block_kind,
            counting_mode: self.counting_mode,
            track_dropped: self.track_dropped,
            setup_only: self.setup,
            async_submit: !self.sync_submit,
            cache_path: PathBuf::from(&self.cache_path),
            results_path: PathBuf::from(&self.results_path),
            peer_grace_period: Duration::from_millis(self.peer_grace_period_ms),
            subscribe_timeout: Duration::from_millis(self.subscribe_timeout_ms),
            min_main_balance: self.min_main_balance,
            open_amount: self.open_amount,
            spam_amount: self.spam_amount,
        })
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<String, BenchmarkError> {
    let url = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("http://{}", value)
    };
    Url::parse(&url).map_err(|_| {
        BenchmarkError::Configuration(format!(
            "Invalid {} '{}': must be a valid HTTP/HTTPS URL",
            field, value
        ))
    })?;
    Ok(url)
}

/// Validated, typed settings of one run
#[derive(Clone, Debug)]
pub struct BenchmarkSettings {
    pub seed: Seed,
    pub rpc_url: String,
    pub work_url: String,
    pub ws_url: Url,
    pub account_count: u32,
    pub timeout: Option<Duration>,
    pub network: Network,
    // threshold of send and change blocks
    pub send_difficulty: u64,
    // threshold of open and receive blocks
    pub receive_difficulty: u64,
    pub concurrency: usize,
    pub peers: Vec<PeerAddress>,
    pub block_kind: BlockKind,
    pub counting_mode: CountingMode,
    pub track_dropped: bool,
    pub setup_only: bool,
    pub async_submit: bool,
    pub cache_path: PathBuf,
    pub results_path: PathBuf,
    pub peer_grace_period: Duration,
    pub subscribe_timeout: Duration,
    pub min_main_balance: Raw,
    pub open_amount: Raw,
    pub spam_amount: Raw,
}
