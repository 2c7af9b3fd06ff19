use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use venft_core::error::VenftError;
use venft_core::types::{AccountId, LockId};

/// Which locks are staked into the distributor, and by whom.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeBinding {
    token_owners: BTreeMap<LockId, AccountId>,
    staked: BTreeMap<AccountId, BTreeSet<LockId>>,
}

impl StakeBinding {
    pub fn staker_of(&self, id: LockId) -> Option<&AccountId> {
        self.token_owners.get(&id)
    }

    pub fn is_staked(&self, id: LockId) -> bool {
        self.token_owners.contains_key(&id)
    }

    pub fn positions_of(&self, staker: &AccountId) -> Vec<LockId> {
        self.staked
            .get(staker)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Fails unless `caller` is the recorded staker of `id`.
    pub fn check_unstake(&self, caller: &AccountId, id: LockId) -> Result<(), VenftError> {
        match self.token_owners.get(&id) {
            None => Err(VenftError::LockNotFound(id)),
            Some(staker) if staker != caller => Err(VenftError::NotStaker {
                lock_id: id,
                caller: caller.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    pub fn bind(&mut self, id: LockId, staker: AccountId) {
        self.staked.entry(staker.clone()).or_default().insert(id);
        self.token_owners.insert(id, staker);
    }

    pub fn unbind(&mut self, id: LockId) -> Option<AccountId> {
        let staker = self.token_owners.remove(&id)?;
        if let Some(ids) = self.staked.get_mut(&staker) {
            ids.remove(&id);
            if ids.is_empty() {
                self.staked.remove(&staker);
            }
        }
        Some(staker)
    }
}
