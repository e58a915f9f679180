use log::{debug, info, warn};
use nano_common::{
    block::{EncodedBlock, Raw, StateBlock},
    crypto::{Address, Hash, KeyPair, PublicKey},
    rpc::WorkProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};

use crate::{
    accounts::AccountState,
    config::BlockKind,
    error::{BenchmarkError, Stage},
};

/// Signed block with its proof of work, ready to be published
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedBlock {
    pub block: StateBlock,
    pub encoded: EncodedBlock,
    pub hash: Hash,
}

impl GeneratedBlock {
    pub fn new(block: StateBlock) -> Self {
        Self {
            encoded: block.encode(),
            hash: block.hash(),
            block,
        }
    }
}

/// One unit of work: build the next block of an account
#[derive(Clone, Debug)]
pub struct GenerationJob {
    pub keypair: KeyPair,
    pub state: AccountState,
}

#[derive(Clone, Debug)]
pub struct GeneratorSettings {
    pub concurrency: usize,
    pub difficulty: u64,
    pub block_kind: BlockKind,
    pub spam_amount: Raw,
    // Destination of send blocks
    pub main_account: PublicKey,
}

/// Bounded pool of workers, each building one block at a time and
/// requesting its proof of work remotely.
pub struct GeneratorPool {
    work: Arc<dyn WorkProvider>,
    settings: GeneratorSettings,
}

impl GeneratorPool {
    pub fn new(work: Arc<dyn WorkProvider>, settings: GeneratorSettings) -> Self {
        Self { work, settings }
    }

    /// Build one block per job. The first failing job fails the whole batch
    /// and cancels the remaining workers.
    pub async fn generate(
        &self,
        jobs: Vec<GenerationJob>,
    ) -> Result<Vec<GeneratedBlock>, BenchmarkError> {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let workers = self.settings.concurrency.clamp(1, total);
        info!("Generating {} blocks with {} workers", total, workers);

        // Every job is queued up front, workers pull from the shared queue
        let (job_sender, job_receiver) = mpsc::channel(total);
        for job in jobs {
            job_sender
                .try_send(job)
                .map_err(|_| BenchmarkError::Configuration("generation queue is full".to_string()))?;
        }
        drop(job_sender);
        let job_receiver = Arc::new(Mutex::new(job_receiver));

        let (result_sender, mut result_receiver) = mpsc::channel(workers);
        let mut set = JoinSet::new();
        for id in 0..workers {
            let queue = Arc::clone(&job_receiver);
            let results = result_sender.clone();
            let work = Arc::clone(&self.work);
            let settings = self.settings.clone();
            set.spawn(async move {
                loop {
                    let job = { queue.lock().await.recv().await };
                    let Some(job) = job else {
                        break;
                    };
                    let result = build_block(work.as_ref(), &settings, job).await;
                    if results.send(result).await.is_err() {
                        break;
                    }
                }
                debug!("Generation worker {} stopped", id);
            });
        }
        drop(result_sender);

        let mut blocks = Vec::with_capacity(total);
        while let Some(result) = result_receiver.recv().await {
            match result {
                Ok(block) => {
                    blocks.push(block);
                    if log::log_enabled!(log::Level::Debug) && blocks.len() % 100 == 0 {
                        debug!("Generated {}/{} blocks", blocks.len(), total);
                    }
                }
                Err(e) => {
                    warn!("Block generation failed, cancelling the batch: {}", e);
                    set.abort_all();
                    return Err(e);
                }
            }
        }

        // Channel closed early only when a worker died before sending
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                return Err(BenchmarkError::Worker {
                    stage: Stage::Generation,
                    reason: e.to_string(),
                });
            }
        }
        if blocks.len() != total {
            return Err(BenchmarkError::Worker {
                stage: Stage::Generation,
                reason: format!("only {} of {} blocks were generated", blocks.len(), total),
            });
        }
        info!("Generated {} blocks", total);
        Ok(blocks)
    }
}

async fn build_block(
    work: &dyn WorkProvider,
    settings: &GeneratorSettings,
    job: GenerationJob,
) -> Result<GeneratedBlock, BenchmarkError> {
    let state = job.state;
    let account = *job.keypair.public_key();

    let mut block = match settings.block_kind {
        BlockKind::Change => {
            // Rotate to a representative derived from the frontier
            let representative = Address::from_hash(&state.frontier).to_public_key();
            StateBlock::change(account, state.frontier, representative, state.balance)
        }
        BlockKind::Send => {
            let balance = state.balance.checked_sub(settings.spam_amount).ok_or_else(|| {
                BenchmarkError::account_state(
                    state.address,
                    format!("balance {} raw below spam amount {}", state.balance, settings.spam_amount),
                )
            })?;
            StateBlock::send(
                account,
                state.frontier,
                state.representative,
                balance,
                &settings.main_account,
            )
        }
    };
    block.sign(&job.keypair);

    let work = work
        .work_generate(&block.work_root(), settings.difficulty)
        .await
        .map_err(|e| BenchmarkError::rpc(Stage::Generation, state.address, e))?;

    Ok(GeneratedBlock::new(block.with_work(work)))
}
