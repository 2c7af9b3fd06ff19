use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use venft_core::error::VenftError;
use venft_core::types::{AccountId, AssetId, Balance};

// ── Transfer legs ─────────────────────────────────────────────────────────────

/// One leg of an asset movement. Deposits and reward funding move into the
/// escrow account; withdrawals and claims move out of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub asset: AssetId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
}

impl Transfer {
    /// `from` → escrow.
    pub fn transfer_in(asset: AssetId, from: AccountId, amount: Balance) -> Self {
        Self { asset, from, to: AccountId::escrow(), amount }
    }

    /// escrow → `to`.
    pub fn transfer_out(asset: AssetId, to: AccountId, amount: Balance) -> Self {
        Self { asset, from: AccountId::escrow(), to, amount }
    }
}

// ── AssetLedger ───────────────────────────────────────────────────────────────

/// The fungible-asset ledger the escrow settles against.
///
/// `transfer` is all-or-nothing over the whole batch: if any leg cannot be
/// honoured, no balance changes.
pub trait AssetLedger: Send {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Balance;

    fn transfer(&mut self, batch: &[Transfer]) -> Result<(), VenftError>;
}

/// Balances held in memory. Used by tests, genesis and the replay node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryAssetLedger {
    balances: BTreeMap<AssetId, BTreeMap<AccountId, Balance>>,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air.
    pub fn mint(&mut self, asset: &AssetId, account: &AccountId, amount: Balance) {
        let bal = self
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(account.clone())
            .or_default();
        *bal = bal.saturating_add(amount);
    }

    /// Σ balances of `asset` across all accounts.
    pub fn supply(&self, asset: &AssetId) -> Balance {
        self.balances
            .get(asset)
            .map(|accounts| accounts.values().sum())
            .unwrap_or(0)
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Balance {
        self.balances
            .get(asset)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, batch: &[Transfer]) -> Result<(), VenftError> {
        // Stage every touched balance, then write back only if all legs pass.
        let mut staged: BTreeMap<(AssetId, AccountId), Balance> = BTreeMap::new();

        for leg in batch.iter().filter(|leg| leg.amount > 0) {
            let from_key = (leg.asset.clone(), leg.from.clone());
            let have = match staged.get(&from_key) {
                Some(b) => *b,
                None => self.balance_of(&leg.asset, &leg.from),
            };
            if have < leg.amount {
                return Err(VenftError::InsufficientBalance {
                    asset: leg.asset.clone(),
                    need: leg.amount,
                    have,
                });
            }
            staged.insert(from_key, have - leg.amount);

            let to_key = (leg.asset.clone(), leg.to.clone());
            let current = match staged.get(&to_key) {
                Some(b) => *b,
                None => self.balance_of(&leg.asset, &leg.to),
            };
            staged.insert(to_key, current.saturating_add(leg.amount));
        }

        for ((asset, account), balance) in staged {
            self.balances.entry(asset).or_default().insert(account, balance);
        }
        Ok(())
    }
}
