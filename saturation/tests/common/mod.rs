// In-memory node doubles shared by the integration tests
//
// The ledger applies processed blocks to its own account table, the
// publisher answers every published block with a confirmation event on the
// notification stream it was paired with.

#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use nano_common::{
    block::{EncodedBlock, Raw, StateBlock, Work},
    crypto::{Address, Hash, PublicKey},
    p2p::{PeerAddress, PublishOutcome, Publisher},
    rpc::{AccountInfo, BlockContents, BlockInfo, BlockSubtype, LedgerRpc, RpcError, WorkProvider},
    websocket::{
        Event, EventMessage, Notification, NotificationError, NotificationStream, SubscriptionAction,
        SubscriptionRequest,
    },
};
use nano_saturation::config::BenchmarkConfig;
use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub const SEED: &str = "9F1D53E732E48F25F94711D5B22086778278624F715D9B2BEC8FB81134E7C904";

// 10 Nano
pub const MAIN_BALANCE: Raw = 10 * 10u128.pow(30);

pub fn config(dir: &Path, count: u32, concurrency: usize) -> BenchmarkConfig {
    BenchmarkConfig {
        seed: Some(SEED.to_string()),
        count,
        concurrency: Some(concurrency),
        network: nano_common::network::Network::Dev,
        peers: vec![PeerAddress::new("127.0.0.1", 44000)],
        cache_path: dir.join("cache.json").display().to_string(),
        results_path: dir.join("results.json").display().to_string(),
        subscribe_timeout_ms: 1000,
        ..Default::default()
    }
}

#[derive(Clone, Debug)]
struct LedgerAccount {
    frontier: Hash,
    balance: Raw,
    representative: PublicKey,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<PublicKey, LedgerAccount>,
    blocks: HashMap<Hash, StateBlock>,
    receivable: HashMap<PublicKey, IndexMap<Hash, Raw>>,
}

/// Ledger applying every processed block like a node would
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    pub process_calls: AtomicUsize,
    pub processed: Mutex<Vec<(BlockSubtype, Hash)>>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_account(self: &Arc<Self>, account: &Address, balance: Raw) -> Arc<Self> {
        let frontier = Hash::new([0xAB; 32]);
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(
            *account.public_key(),
            LedgerAccount {
                frontier,
                balance,
                representative: *account.public_key(),
            },
        );
        drop(state);
        Arc::clone(self)
    }

    pub fn with_receivable(self: &Arc<Self>, account: &Address, source: Hash, amount: Raw) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .receivable
            .entry(*account.public_key())
            .or_default()
            .insert(source, amount);
        Arc::clone(self)
    }

    pub fn balance(&self, account: &Address) -> Option<Raw> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(account.public_key())
            .map(|a| a.balance)
    }

    pub fn frontier(&self, account: &Address) -> Option<Hash> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(account.public_key())
            .map(|a| a.frontier)
    }

    fn reject(message: &str) -> RpcError {
        RpcError::Node {
            action: "process",
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn account_info(&self, account: &Address) -> Result<AccountInfo, RpcError> {
        let state = self.state.lock().unwrap();
        let info = state
            .accounts
            .get(account.public_key())
            .ok_or_else(|| RpcError::AccountNotFound(account.to_string()))?;
        Ok(AccountInfo {
            frontier: info.frontier,
            balance: info.balance,
            representative: Some(Address::new(info.representative)),
            block_count: None,
        })
    }

    async fn accounts_frontiers(
        &self,
        accounts: &[Address],
    ) -> Result<IndexMap<Address, Option<Hash>>, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(accounts
            .iter()
            .map(|account| {
                let frontier = state.accounts.get(account.public_key()).map(|a| a.frontier);
                (*account, frontier)
            })
            .collect())
    }

    async fn receivable(&self, account: &Address, threshold: Raw) -> Result<IndexMap<Hash, Raw>, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .receivable
            .get(account.public_key())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|(_, amount)| **amount >= threshold)
                    .map(|(hash, amount)| (*hash, *amount))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn blocks_info(&self, hashes: &[Hash]) -> Result<IndexMap<Hash, BlockInfo>, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(hashes
            .iter()
            .filter_map(|hash| state.blocks.get(hash).map(|block| (*hash, block)))
            .map(|(hash, block)| {
                let info = BlockInfo {
                    block_account: Address::new(block.account),
                    amount: None,
                    balance: block.balance,
                    height: None,
                    subtype: None,
                    contents: BlockContents {
                        kind: "state".to_string(),
                        representative: Some(Address::new(block.representative)),
                        balance: Some(block.balance),
                    },
                };
                (hash, info)
            })
            .collect())
    }

    async fn process(
        &self,
        block: &StateBlock,
        subtype: Option<BlockSubtype>,
        _async_submit: bool,
    ) -> Result<Option<Hash>, RpcError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        let hash = block.hash();
        let mut state = self.state.lock().unwrap();

        let current = state.accounts.get(&block.account).cloned();
        match current {
            None => {
                if !block.previous.is_zero() {
                    return Err(Self::reject("Gap previous block"));
                }
                let amount = state
                    .receivable
                    .get_mut(&block.account)
                    .and_then(|blocks| blocks.shift_remove(&block.link))
                    .ok_or_else(|| Self::reject("Gap source block"))?;
                if amount != block.balance {
                    return Err(Self::reject("Balance and amount delta do not match"));
                }
            }
            Some(current) => {
                if current.frontier != block.previous {
                    return Err(Self::reject("Fork"));
                }
                if block.balance < current.balance {
                    let destination = PublicKey::from(block.link);
                    state
                        .receivable
                        .entry(destination)
                        .or_default()
                        .insert(hash, current.balance - block.balance);
                }
            }
        }

        state.accounts.insert(
            block.account,
            LedgerAccount {
                frontier: hash,
                balance: block.balance,
                representative: block.representative,
            },
        );
        state.blocks.insert(hash, block.clone());
        if let Some(subtype) = subtype {
            self.processed.lock().unwrap().push((subtype, hash));
        }
        Ok(Some(hash))
    }
}

/// Work server tracking calls and concurrent requests
#[derive(Default)]
pub struct MockWork {
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockWork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkProvider for MockWork {
    async fn work_generate(&self, root: &Hash, _difficulty: u64) -> Result<Work, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&root.as_bytes()[..8]);
        Ok(Work::new(u64::from_le_bytes(bytes) | 1))
    }
}

/// What the fake network observed, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Subscribed,
    Published(Hash),
    Unsubscribed,
}

pub type Steps = Arc<Mutex<Vec<Step>>>;

/// Publisher whose every frame is confirmed on the paired stream
pub struct MockPublisher {
    ready: usize,
    confirmations: mpsc::UnboundedSender<Notification>,
    steps: Steps,
    pub frames: Mutex<Vec<EncodedBlock>>,
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn connect(&self, peers: &[PeerAddress], _grace_period: Duration) -> usize {
        self.ready.min(peers.len())
    }

    async fn publish(&self, block: &EncodedBlock) -> PublishOutcome {
        let hash = match block.decode() {
            Ok(block) => block.hash(),
            Err(_) => return PublishOutcome { delivered: 0, failed: 1 },
        };
        self.frames.lock().unwrap().push(block.clone());
        self.steps.lock().unwrap().push(Step::Published(hash));
        let _ = self.confirmations.send(Notification::Event(Event {
            topic: "confirmation".to_string(),
            message: EventMessage { hash, account: None },
        }));
        PublishOutcome {
            delivered: self.ready,
            failed: 0,
        }
    }

    async fn peer_count(&self) -> usize {
        self.ready
    }
}

/// Notification feed acking subscriptions when `ack` is set
pub struct MockNotifications {
    ack: bool,
    pending: VecDeque<Notification>,
    incoming: mpsc::UnboundedReceiver<Notification>,
    steps: Steps,
}

#[async_trait]
impl NotificationStream for MockNotifications {
    async fn send(&mut self, request: &SubscriptionRequest) -> Result<(), NotificationError> {
        match request.action {
            SubscriptionAction::Subscribe => {
                if self.ack {
                    self.steps.lock().unwrap().push(Step::Subscribed);
                    self.pending.push_back(Notification::Ack("subscribe".to_string()));
                }
            }
            SubscriptionAction::Unsubscribe => self.steps.lock().unwrap().push(Step::Unsubscribed),
        }
        Ok(())
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, NotificationError> {
        if let Some(notification) = self.pending.pop_front() {
            return Ok(Some(notification));
        }
        Ok(self.incoming.recv().await)
    }

    async fn close(&mut self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Paired publisher and notification stream of one fake node
pub fn network(ready_peers: usize, ack: bool) -> (Arc<MockPublisher>, MockNotifications, Steps) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let steps: Steps = Arc::new(Mutex::new(Vec::new()));
    let publisher = Arc::new(MockPublisher {
        ready: ready_peers,
        confirmations: sender,
        steps: Arc::clone(&steps),
        frames: Mutex::new(Vec::new()),
    });
    let stream = MockNotifications {
        ack,
        pending: VecDeque::new(),
        incoming: receiver,
        steps: Arc::clone(&steps),
    };
    (publisher, stream, steps)
}

/// Ledger that accepts every call and never answers
pub struct SilentLedger;

#[async_trait]
impl LedgerRpc for SilentLedger {
    async fn account_info(&self, _account: &Address) -> Result<AccountInfo, RpcError> {
        std::future::pending().await
    }

    async fn accounts_frontiers(
        &self,
        _accounts: &[Address],
    ) -> Result<IndexMap<Address, Option<Hash>>, RpcError> {
        std::future::pending().await
    }

    async fn receivable(&self, _account: &Address, _threshold: Raw) -> Result<IndexMap<Hash, Raw>, RpcError> {
        std::future::pending().await
    }

    async fn blocks_info(&self, _hashes: &[Hash]) -> Result<IndexMap<Hash, BlockInfo>, RpcError> {
        std::future::pending().await
    }

    async fn process(
        &self,
        _block: &StateBlock,
        _subtype: Option<BlockSubtype>,
        _async_submit: bool,
    ) -> Result<Option<Hash>, RpcError> {
        std::future::pending().await
    }
}
