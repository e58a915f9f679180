use log::{info, warn};
use nano_common::{
    p2p::Publisher,
    rpc::{LedgerRpc, WorkProvider},
    time::RunClock,
    websocket::NotificationStream,
};
use std::{future::Future, sync::Arc};

use crate::{
    accounts::AccountSet,
    broadcast::BroadcastCoordinator,
    cache::{BenchmarkCache, ResultCache},
    config::BenchmarkSettings,
    error::BenchmarkError,
    generator::{GeneratedBlock, GenerationJob, GeneratorPool, GeneratorSettings},
    provisioner::{Provisioned, Provisioner, ProvisionerSettings},
    report::{measure, MeasurementResult, ResultLog},
    tracker::ConfirmationTracker,
};

/// Whole benchmark run: provisioning, generation or cache, broadcast and
/// confirmation tracking, then measurement. Each stage only starts once the
/// previous one fully completed.
pub struct Pipeline {
    settings: BenchmarkSettings,
    accounts: AccountSet,
    rpc: Arc<dyn LedgerRpc>,
    work: Arc<dyn WorkProvider>,
    publisher: Arc<dyn Publisher>,
    cache: ResultCache,
    results: ResultLog,
    clock: RunClock,
}

impl Pipeline {
    pub fn new(
        settings: BenchmarkSettings,
        rpc: Arc<dyn LedgerRpc>,
        work: Arc<dyn WorkProvider>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let accounts = AccountSet::derive(&settings.seed, settings.account_count);
        Self {
            cache: ResultCache::new(&settings.cache_path),
            results: ResultLog::new(&settings.results_path),
            clock: RunClock::start(),
            accounts,
            settings,
            rpc,
            work,
            publisher,
        }
    }

    pub fn accounts(&self) -> &AccountSet {
        &self.accounts
    }

    /// Open every benchmark account, nothing else
    pub async fn provision(&self) -> Result<Provisioned, BenchmarkError> {
        let provisioner = Provisioner::new(
            Arc::clone(&self.rpc),
            Arc::clone(&self.work),
            ProvisionerSettings {
                min_main_balance: self.settings.min_main_balance,
                open_amount: self.settings.open_amount,
                send_difficulty: self.settings.send_difficulty,
                receive_difficulty: self.settings.receive_difficulty,
                async_submit: self.settings.async_submit,
            },
        );
        let provisioned = provisioner.provision(&self.accounts).await?;
        info!(
            "Provisioning complete: {} accounts ready, {} opened by this run",
            provisioned.accounts.len(),
            provisioned.opened
        );
        Ok(provisioned)
    }

    /// Provisioning only, bounded by the configured timeout
    pub async fn setup(&self) -> Result<Provisioned, BenchmarkError> {
        self.bounded(self.provision()).await
    }

    /// Run the benchmark, bounded by the configured timeout. A run that
    /// times out records nothing.
    pub async fn run(
        &self,
        stream: Box<dyn NotificationStream>,
    ) -> Result<MeasurementResult, BenchmarkError> {
        self.bounded(self.execute(stream)).await
    }

    /// Same as `run`, the notification stream is opened inside the timeout
    pub async fn run_connecting<F>(&self, connect: F) -> Result<MeasurementResult, BenchmarkError>
    where
        F: Future<Output = Result<Box<dyn NotificationStream>, BenchmarkError>>,
    {
        self.bounded(async {
            let stream = connect.await?;
            self.execute(stream).await
        })
        .await
    }

    async fn bounded<T>(
        &self,
        stage: impl Future<Output = Result<T, BenchmarkError>>,
    ) -> Result<T, BenchmarkError> {
        match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, stage)
                .await
                .map_err(|_| BenchmarkError::Timeout(timeout))?,
            None => stage.await,
        }
    }

    async fn execute(
        &self,
        stream: Box<dyn NotificationStream>,
    ) -> Result<MeasurementResult, BenchmarkError> {
        let provisioned = self.provision().await?;
        let blocks = self.blocks(&provisioned).await?;

        let coordinator = BroadcastCoordinator::new(Arc::clone(&self.publisher), self.clock);
        coordinator
            .connect(&self.settings.peers, self.settings.peer_grace_period)
            .await?;

        let mut tracker = ConfirmationTracker::new(
            stream,
            blocks.iter().map(|block| block.hash),
            self.settings.counting_mode,
            self.clock,
        );
        tracker
            .subscribe(
                self.accounts.target_addresses(),
                self.settings.track_dropped,
                self.settings.subscribe_timeout,
            )
            .await?;

        // Both sides share nothing but the node
        let (tracking, broadcast) = tokio::join!(tracker.run(), coordinator.broadcast(&blocks));
        let tracking = tracking?;
        if broadcast.delivered == 0 {
            warn!("No block was delivered to any peer");
        }

        let result = measure(
            blocks.len(),
            &broadcast,
            &tracking,
            self.settings.network,
            self.settings.block_kind,
        );
        info!(
            "{} confirmations in {:.3}s: {:.2} confirmations per second",
            result.num_accounts, result.total_duration_seconds, result.confirmations_per_second
        );
        self.results.append(&result).await?;
        Ok(result)
    }

    // Cached block set when it still applies, freshly generated otherwise
    async fn blocks(&self, provisioned: &Provisioned) -> Result<Vec<GeneratedBlock>, BenchmarkError> {
        if let Some(cache) = self.cache.load(&self.accounts.main.address).await? {
            if cache.is_current(&provisioned.accounts) {
                info!("Reusing {} cached blocks from {}", cache.blocks.len(), self.cache.path().display());
                return Ok(cache.blocks);
            }
            info!("Cached blocks no longer match the account frontiers, regenerating");
        }

        let pool = GeneratorPool::new(
            Arc::clone(&self.work),
            GeneratorSettings {
                concurrency: self.settings.concurrency,
                difficulty: self.settings.send_difficulty,
                block_kind: self.settings.block_kind,
                spam_amount: self.settings.spam_amount,
                main_account: *self.accounts.main.public_key(),
            },
        );

        let jobs = self
            .accounts
            .targets
            .iter()
            .zip(provisioned.accounts.iter())
            .map(|(account, state)| GenerationJob {
                keypair: account.keypair().clone(),
                state: state.clone(),
            })
            .collect();
        let blocks = pool.generate(jobs).await?;

        self.cache
            .save(&BenchmarkCache::new(self.accounts.main.address, blocks.clone()))
            .await?;
        Ok(blocks)
    }
}
