use nano_common::{
    block::{Raw, StateBlock},
    crypto::{Address, Hash, KeyPair, PublicKey, Seed},
};

/// Account derived from the benchmark seed
#[derive(Clone, Debug)]
pub struct Account {
    pub index: u32,
    pub address: Address,
    keypair: KeyPair,
}

impl Account {
    pub fn derive(seed: &Seed, index: u32) -> Self {
        let keypair = KeyPair::from_private_key(seed.derive_private_key(index));
        Self {
            index,
            address: Address::new(*keypair.public_key()),
            keypair,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

/// Main account (index 0) and the `count` benchmark accounts (1..=count)
#[derive(Clone, Debug)]
pub struct AccountSet {
    pub main: Account,
    pub targets: Vec<Account>,
}

impl AccountSet {
    pub fn derive(seed: &Seed, count: u32) -> Self {
        Self {
            main: Account::derive(seed, 0),
            targets: (1..=count).map(|index| Account::derive(seed, index)).collect(),
        }
    }

    pub fn target_addresses(&self) -> Vec<Address> {
        self.targets.iter().map(|account| account.address).collect()
    }
}

/// Ledger state of an account as known locally.
///
/// Projected forward with [`AccountState::apply`] when a block is submitted
/// so several blocks can be chained before any of them is confirmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountState {
    pub address: Address,
    pub frontier: Hash,
    pub balance: Raw,
    pub representative: PublicKey,
}

impl AccountState {
    pub fn is_open(&self) -> bool {
        !self.frontier.is_zero()
    }

    pub fn apply(&mut self, block: &StateBlock) {
        self.frontier = block.hash();
        self.balance = block.balance;
        self.representative = block.representative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_set_layout() {
        let seed = Seed::from_bytes([0u8; 32]);
        let set = AccountSet::derive(&seed, 3);
        assert_eq!(set.main.index, 0);
        assert_eq!(set.targets.iter().map(|a| a.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(
            set.main.public_key().to_hex(),
            "C008B814A7D269A1FA3C6528B19201A24D797912DB9996FF02A1FF356E45552B"
        );

        // Deterministic across derivations
        let again = AccountSet::derive(&seed, 3);
        assert_eq!(set.target_addresses(), again.target_addresses());
    }

    #[test]
    fn test_apply_projects_block() {
        let seed = Seed::from_bytes([1u8; 32]);
        let main = Account::derive(&seed, 0);
        let mut state = AccountState {
            address: main.address,
            frontier: Hash::new([1; 32]),
            balance: 100,
            representative: *main.public_key(),
        };
        let send = StateBlock::send(
            *main.public_key(),
            state.frontier,
            state.representative,
            90,
            &PublicKey::from_bytes([2; 32]),
        );
        state.apply(&send);
        assert_eq!(state.frontier, send.hash());
        assert_eq!(state.balance, 90);
        assert!(state.is_open());
    }
}
