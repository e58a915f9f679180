use log::{debug, info, warn};
use nano_common::crypto::{Address, Hash, PublicKey};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

use crate::{accounts::AccountState, error::BenchmarkError, generator::GeneratedBlock};

/// Generated block set of the last run, keyed by the main account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkCache {
    pub account: Address,
    pub blocks: Vec<GeneratedBlock>,
}

impl BenchmarkCache {
    pub fn new(account: Address, blocks: Vec<GeneratedBlock>) -> Self {
        Self { account, blocks }
    }

    /// A cached set is only reusable when every block still chains on the
    /// current frontier of its account, one block per account.
    pub fn is_current(&self, states: &[AccountState]) -> bool {
        if self.blocks.len() != states.len() {
            return false;
        }

        let frontiers: HashMap<PublicKey, Hash> = states
            .iter()
            .map(|state| (*state.address.public_key(), state.frontier))
            .collect();
        if frontiers.len() != states.len() {
            return false;
        }

        let mut seen = HashMap::with_capacity(self.blocks.len());
        self.blocks.iter().all(|generated| {
            let block = &generated.block;
            frontiers.get(&block.account) == Some(&block.previous)
                && seen.insert(block.account, ()).is_none()
                && generated.hash == block.hash()
                && generated.encoded == block.encode()
        })
    }
}

/// Single entry JSON file holding the last generated block set
pub struct ResultCache {
    path: PathBuf,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached set for this main account. A missing or unreadable file, or
    /// one written for another account, is a miss.
    pub async fn load(&self, account: &Address) -> Result<Option<BenchmarkCache>, BenchmarkError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(BenchmarkError::storage(&self.path, e)),
        };

        let cache: BenchmarkCache = match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring unreadable cache {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        if cache.account != *account {
            info!(
                "Cache {} belongs to {}, not {}",
                self.path.display(),
                cache.account,
                account
            );
            return Ok(None);
        }
        Ok(Some(cache))
    }

    /// Overwrite the cache file with this block set
    pub async fn save(&self, cache: &BenchmarkCache) -> Result<(), BenchmarkError> {
        let content = serde_json::to_string_pretty(cache)
            .map_err(|e| BenchmarkError::storage(&self.path, e))?;
        write_atomic(&self.path, content.as_bytes()).await?;
        if log::log_enabled!(log::Level::Debug) {
            debug!("Saved {} blocks to {}", cache.blocks.len(), self.path.display());
        }
        Ok(())
    }
}

// Write next to the target then rename over it
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), BenchmarkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BenchmarkError::storage(parent, e))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, content)
        .await
        .map_err(|e| BenchmarkError::storage(&temp, e))?;
    fs::rename(&temp, path)
        .await
        .map_err(|e| BenchmarkError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nano_common::{
        block::{StateBlock, Work},
        crypto::{KeyPair, Seed},
    };
    use tempfile::TempDir;

    fn keypair(index: u32) -> KeyPair {
        KeyPair::from_private_key(Seed::from_bytes([5u8; 32]).derive_private_key(index))
    }

    fn state(index: u32) -> AccountState {
        let keypair = keypair(index);
        AccountState {
            address: Address::new(*keypair.public_key()),
            frontier: Hash::new([index as u8; 32]),
            balance: 10,
            representative: *keypair.public_key(),
        }
    }

    fn generated(index: u32, state: &AccountState) -> GeneratedBlock {
        let keypair = keypair(index);
        let mut block = StateBlock::change(
            *keypair.public_key(),
            state.frontier,
            Address::from_hash(&state.frontier).to_public_key(),
            state.balance,
        );
        block.sign(&keypair);
        GeneratedBlock::new(block.with_work(Work::new(0x1122334455667788)))
    }

    fn sample() -> (Vec<AccountState>, BenchmarkCache) {
        let states = vec![state(1), state(2)];
        let blocks = (1..).zip(states.iter()).map(|(index, state)| generated(index, state)).collect();
        let main = Address::new(*keypair(0).public_key());
        (states, BenchmarkCache::new(main, blocks))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path().join("nested").join("cache.json"));
        let (_, entry) = sample();

        assert!(cache.load(&entry.account).await.unwrap().is_none());
        cache.save(&entry).await.unwrap();
        assert_eq!(cache.load(&entry.account).await.unwrap(), Some(entry.clone()));

        // Plain JSON object with the main account and the blocks
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw["account"], entry.account.to_string());
        assert_eq!(raw["blocks"].as_array().unwrap().len(), 2);
        assert!(!dir.path().join("nested").join("cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_other_account_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path().join("cache.json"));
        let (_, entry) = sample();
        cache.save(&entry).await.unwrap();

        let other = Address::new(*keypair(9).public_key());
        assert!(cache.load(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = ResultCache::new(path);
        let (_, entry) = sample();
        assert!(cache.load(&entry.account).await.unwrap().is_none());
    }

    #[test]
    fn test_is_current() {
        let (states, entry) = sample();
        assert!(entry.is_current(&states));

        // Frontier moved on since the blocks were generated
        let mut moved = states.clone();
        moved[1].frontier = Hash::new([7; 32]);
        assert!(!entry.is_current(&moved));

        // Different account count
        assert!(!entry.is_current(&states[..1]));

        // Tampered encoding
        let mut tampered = entry.clone();
        tampered.blocks[0].hash = Hash::new([0xAA; 32]);
        assert!(!tampered.is_current(&states));
    }
}
