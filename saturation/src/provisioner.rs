use indexmap::IndexMap;
use log::{debug, info};
use nano_common::{
    block::{Raw, StateBlock},
    crypto::{Address, Hash, PublicKey},
    rpc::{BlockSubtype, LedgerRpc, RpcError, WorkProvider},
};
use std::sync::Arc;

use crate::{
    accounts::{Account, AccountSet, AccountState},
    error::{BenchmarkError, Stage},
};

// Smallest receivable considered when opening an account
const RECEIVABLE_THRESHOLD: Raw = 1;

#[derive(Clone, Debug)]
pub struct ProvisionerSettings {
    pub min_main_balance: Raw,
    pub open_amount: Raw,
    pub send_difficulty: u64,
    pub receive_difficulty: u64,
    pub async_submit: bool,
}

/// Ledger state of every account once provisioning completed
#[derive(Clone, Debug)]
pub struct Provisioned {
    pub main: AccountState,
    // Same order as `AccountSet::targets`
    pub accounts: Vec<AccountState>,
    // Accounts opened by this run
    pub opened: usize,
}

/// Makes sure every benchmark account is opened, funding it from the main
/// account when no receivable transfer is waiting for it.
pub struct Provisioner {
    rpc: Arc<dyn LedgerRpc>,
    work: Arc<dyn WorkProvider>,
    settings: ProvisionerSettings,
}

impl Provisioner {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        work: Arc<dyn WorkProvider>,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            rpc,
            work,
            settings,
        }
    }

    pub async fn provision(&self, accounts: &AccountSet) -> Result<Provisioned, BenchmarkError> {
        let mut main = self.main_state(&accounts.main).await?;
        info!("Main account {} holds {} raw", main.address, main.balance);

        if main.balance < self.settings.min_main_balance {
            return Err(BenchmarkError::InsufficientFunds {
                account: main.address.to_string(),
                balance: main.balance,
                required: self.settings.min_main_balance,
            });
        }

        let addresses = accounts.target_addresses();
        let frontiers = self
            .rpc
            .accounts_frontiers(&addresses)
            .await
            .map_err(|e| BenchmarkError::rpc(Stage::Provisioning, "accounts_frontiers", e))?;

        // Existing receivables open an account without funding from main
        let mut receivables = IndexMap::new();
        for account in accounts.targets.iter() {
            if matches!(frontiers.get(&account.address), Some(Some(_))) {
                continue;
            }
            let receivable = self
                .rpc
                .receivable(&account.address, RECEIVABLE_THRESHOLD)
                .await
                .map_err(|e| BenchmarkError::rpc(Stage::Provisioning, account.address, e))?;
            receivables.insert(account.address, receivable.into_iter().next());
        }

        let unopened = receivables.len();
        let unfunded = receivables.values().filter(|r| r.is_none()).count();
        let required = self
            .settings
            .open_amount
            .checked_mul(unfunded as Raw)
            .unwrap_or(Raw::MAX)
            .max(self.settings.min_main_balance);
        if main.balance < required {
            return Err(BenchmarkError::InsufficientFunds {
                account: main.address.to_string(),
                balance: main.balance,
                required,
            });
        }
        info!(
            "{} of {} benchmark accounts need to be opened, {} funded by the main account",
            unopened,
            addresses.len(),
            unfunded
        );

        let mut opened_states = IndexMap::new();
        for account in accounts.targets.iter() {
            let Some(receivable) = receivables.get(&account.address) else {
                continue;
            };
            let state = self
                .open_account(&accounts.main, &mut main, account, *receivable)
                .await?;
            opened_states.insert(account.address, state);
            info!(
                "Opened account #{} {} ({}/{})",
                account.index,
                account.address,
                opened_states.len(),
                unopened
            );
        }

        let existing: Vec<Hash> = frontiers.values().filter_map(|f| *f).collect();
        let mut existing_states = self.existing_states(&existing).await?;

        let mut states = Vec::with_capacity(accounts.targets.len());
        for account in accounts.targets.iter() {
            let state = match opened_states.shift_remove(&account.address) {
                Some(state) => state,
                None => {
                    let frontier = frontiers
                        .get(&account.address)
                        .copied()
                        .flatten()
                        .ok_or_else(|| BenchmarkError::account_state(account.address, "no frontier"))?;
                    let (balance, representative) = existing_states
                        .shift_remove(&frontier)
                        .ok_or_else(|| {
                            BenchmarkError::account_state(
                                account.address,
                                format!("frontier {} unknown to the node", frontier),
                            )
                        })?;
                    AccountState {
                        address: account.address,
                        frontier,
                        balance,
                        representative,
                    }
                }
            };
            states.push(state);
        }

        Ok(Provisioned {
            main,
            accounts: states,
            opened: unopened,
        })
    }

    async fn main_state(&self, main: &Account) -> Result<AccountState, BenchmarkError> {
        let info = match self.rpc.account_info(&main.address).await {
            Ok(info) => info,
            Err(RpcError::AccountNotFound(_)) => {
                return Err(BenchmarkError::account_state(
                    main.address,
                    "main account is not opened",
                ))
            }
            Err(e) => return Err(BenchmarkError::rpc(Stage::Provisioning, main.address, e)),
        };

        if info.frontier.is_zero() {
            return Err(BenchmarkError::account_state(main.address, "main account has no frontier"));
        }

        let representative = match info.representative {
            Some(representative) => representative.to_public_key(),
            None => {
                // Old nodes omit it, read it from the frontier block
                let (_, representative) = self
                    .existing_states(&[info.frontier])
                    .await?
                    .shift_remove(&info.frontier)
                    .ok_or_else(|| {
                        BenchmarkError::account_state(main.address, "frontier block unknown to the node")
                    })?;
                representative
            }
        };

        Ok(AccountState {
            address: main.address,
            frontier: info.frontier,
            balance: info.balance,
            representative,
        })
    }

    // Balance and representative of already opened accounts, keyed by frontier
    async fn existing_states(
        &self,
        frontiers: &[Hash],
    ) -> Result<IndexMap<Hash, (Raw, PublicKey)>, BenchmarkError> {
        if frontiers.is_empty() {
            return Ok(IndexMap::new());
        }

        let infos = self
            .rpc
            .blocks_info(frontiers)
            .await
            .map_err(|e| BenchmarkError::rpc(Stage::Provisioning, "blocks_info", e))?;

        let mut states = IndexMap::with_capacity(infos.len());
        for (hash, info) in infos {
            let representative = info.contents.representative.ok_or_else(|| {
                BenchmarkError::account_state(
                    info.block_account,
                    format!("frontier {} is not a state block", hash),
                )
            })?;
            states.insert(hash, (info.balance, representative.to_public_key()));
        }
        Ok(states)
    }

    async fn open_account(
        &self,
        main_account: &Account,
        main: &mut AccountState,
        account: &Account,
        receivable: Option<(Hash, Raw)>,
    ) -> Result<AccountState, BenchmarkError> {
        let (source, amount) = match receivable {
            Some((hash, amount)) => {
                debug!("Account {} already has a receivable {} of {} raw", account.address, hash, amount);
                (hash, amount)
            }
            None => {
                let hash = self.fund(main_account, main, account.public_key()).await?;
                (hash, self.settings.open_amount)
            }
        };

        let mut open = StateBlock::receive(
            *account.public_key(),
            Hash::zero(),
            main.representative,
            amount,
            source,
        );
        open.sign(account.keypair());
        let open = self
            .stamp(open, self.settings.receive_difficulty, &account.address)
            .await?;
        self.submit(&open, BlockSubtype::Open, &account.address).await?;

        let mut state = AccountState {
            address: account.address,
            frontier: Hash::zero(),
            balance: 0,
            representative: main.representative,
        };
        state.apply(&open);
        Ok(state)
    }

    // Send `open_amount` from the main account, chained on its local frontier
    async fn fund(
        &self,
        main_account: &Account,
        main: &mut AccountState,
        destination: &PublicKey,
    ) -> Result<Hash, BenchmarkError> {
        let balance = main
            .balance
            .checked_sub(self.settings.open_amount)
            .ok_or_else(|| BenchmarkError::InsufficientFunds {
                account: main.address.to_string(),
                balance: main.balance,
                required: self.settings.open_amount,
            })?;

        let mut send = StateBlock::send(
            *main_account.public_key(),
            main.frontier,
            main.representative,
            balance,
            destination,
        );
        send.sign(main_account.keypair());
        let send = self
            .stamp(send, self.settings.send_difficulty, &main.address)
            .await?;
        self.submit(&send, BlockSubtype::Send, &main.address).await?;

        main.apply(&send);
        Ok(send.hash())
    }

    async fn stamp(
        &self,
        block: StateBlock,
        difficulty: u64,
        account: &Address,
    ) -> Result<StateBlock, BenchmarkError> {
        let work = self
            .work
            .work_generate(&block.work_root(), difficulty)
            .await
            .map_err(|e| BenchmarkError::rpc(Stage::Provisioning, account, e))?;
        Ok(block.with_work(work))
    }

    async fn submit(
        &self,
        block: &StateBlock,
        subtype: BlockSubtype,
        account: &Address,
    ) -> Result<(), BenchmarkError> {
        let hash = self
            .rpc
            .process(block, Some(subtype), self.settings.async_submit)
            .await
            .map_err(|e| BenchmarkError::rpc(Stage::Provisioning, account, e))?;

        if let Some(hash) = hash {
            if hash != block.hash() {
                return Err(BenchmarkError::account_state(
                    account,
                    format!("node processed {} as {}", block.hash(), hash),
                ));
            }
        }
        debug!("Submitted {} block {} for {}", subtype, block.hash(), account);
        Ok(())
    }
}
