use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use venft_core::aggregate::GlobalPowerInfo;
use venft_core::error::VenftError;
use venft_core::lock::{Lock, MergePreview};
use venft_core::operation::{Operation, Outcome};
use venft_core::reward::RewardTokenEntry;
use venft_core::types::{AccountId, AssetId, Balance, LockId, Seconds, Timestamp};

use crate::assets::{AssetLedger, Transfer};
use crate::clock::Clock;
use crate::distributor::RewardDistributor;
use crate::registry::LockRegistry;
use crate::stake::StakeBinding;

// ── Ledger state ──────────────────────────────────────────────────────────────

/// Everything the ledger owns. Plain data: snapshotted to storage as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub admin: AccountId,
    pub deposit_asset: AssetId,
    /// Time of the last committed operation.
    pub last_now: Timestamp,
    pub registry: LockRegistry,
    pub distributor: RewardDistributor,
    pub stakes: StakeBinding,
}

impl LedgerState {
    pub fn new(admin: AccountId, deposit_asset: AssetId, now: Timestamp) -> Self {
        Self {
            admin,
            deposit_asset,
            last_now: now,
            registry: LockRegistry::new(now),
            distributor: RewardDistributor::new(now),
            stakes: StakeBinding::default(),
        }
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), VenftError> {
        if caller != &self.admin {
            return Err(VenftError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    /// A lock `caller` owns and that is not staked.
    fn free_lock(&self, caller: &AccountId, id: LockId) -> Result<&Lock, VenftError> {
        let lock = self.registry.owned(caller, id)?;
        if self.stakes.is_staked(id) {
            return Err(VenftError::LockStaked(id));
        }
        Ok(lock)
    }

    // ── Locks ─────────────────────────────────────────────────────────────────

    fn create_lock<A: AssetLedger>(
        &mut self,
        assets: &mut A,
        caller: &AccountId,
        amount: Balance,
        duration: Seconds,
        now: Timestamp,
    ) -> Result<LockId, VenftError> {
        LockRegistry::check_create(amount, duration)?;
        assets.transfer(&[Transfer::transfer_in(self.deposit_asset.clone(), caller.clone(), amount)])?;

        let id = self.registry.mint(caller.clone(), amount, duration, now);
        info!(%caller, lock_id = id.0, amount, duration, "created lock");
        Ok(id)
    }

    fn extend_lock(
        &mut self,
        caller: &AccountId,
        id: LockId,
        extra: Seconds,
        now: Timestamp,
    ) -> Result<LockId, VenftError> {
        let lock = self.free_lock(caller, id)?;
        let duration = LockRegistry::extended_duration(lock, extra, now)?;
        let amount = lock.amount;

        self.registry.burn(id, now);
        let minted = self.registry.mint(caller.clone(), amount, duration, now);
        info!(%caller, burned = id.0, minted = minted.0, duration, "extended lock");
        Ok(minted)
    }

    fn merge_locks(
        &mut self,
        caller: &AccountId,
        first: LockId,
        second: LockId,
        now: Timestamp,
    ) -> Result<LockId, VenftError> {
        if first == second {
            return Err(VenftError::InvalidMerge(first));
        }
        let a = self.free_lock(caller, first)?;
        let b = self.free_lock(caller, second)?;
        let plan = LockRegistry::plan_merge(a, b, now)?;

        self.registry.burn(first, now);
        self.registry.burn(second, now);
        let minted = self.registry.mint(caller.clone(), plan.amount, plan.duration, now);
        info!(
            %caller,
            first = first.0,
            second = second.0,
            minted = minted.0,
            amount = plan.amount,
            duration = plan.duration,
            "merged locks"
        );
        Ok(minted)
    }

    fn withdraw<A: AssetLedger>(
        &mut self,
        assets: &mut A,
        caller: &AccountId,
        id: LockId,
        now: Timestamp,
    ) -> Result<Balance, VenftError> {
        let lock = self.free_lock(caller, id)?;
        if !lock.is_expired(now) {
            return Err(VenftError::LockNotExpired { end_time: lock.end_time });
        }
        let amount = lock.amount;
        assets.transfer(&[Transfer::transfer_out(self.deposit_asset.clone(), caller.clone(), amount)])?;

        self.registry.burn(id, now);
        info!(%caller, lock_id = id.0, amount, "withdrew lock");
        Ok(amount)
    }

    fn transfer_lock(
        &mut self,
        caller: &AccountId,
        id: LockId,
        to: &AccountId,
        now: Timestamp,
    ) -> Result<(), VenftError> {
        self.free_lock(caller, id)?;
        self.registry.checkpoint(now);
        self.registry.reassign(id, to.clone());
        info!(%caller, %to, lock_id = id.0, "transferred lock");
        Ok(())
    }

    // ── Staking ───────────────────────────────────────────────────────────────

    fn stake(&mut self, caller: &AccountId, id: LockId, now: Timestamp) -> Result<(), VenftError> {
        let lock = self.registry.owned(caller, id)?;
        if self.stakes.is_staked(id) {
            return Err(VenftError::AlreadyStaked(id));
        }
        if lock.is_expired(now) {
            return Err(VenftError::LockExpired(id));
        }

        self.distributor.stake(caller, lock, now);
        self.stakes.bind(id, caller.clone());
        info!(%caller, lock_id = id.0, "staked lock");
        Ok(())
    }

    fn unstake(&mut self, caller: &AccountId, id: LockId, now: Timestamp) -> Result<(), VenftError> {
        self.stakes.check_unstake(caller, id)?;
        let lock = self.registry.get(id)?;

        self.distributor.unstake(caller, lock, now);
        self.stakes.unbind(id);
        info!(%caller, lock_id = id.0, "unstaked lock");
        Ok(())
    }

    // ── Rewards ───────────────────────────────────────────────────────────────

    fn claim_rewards<A: AssetLedger>(
        &mut self,
        assets: &mut A,
        caller: &AccountId,
        token: &AssetId,
        now: Timestamp,
    ) -> Result<Balance, VenftError> {
        let pending = self.distributor.pending(caller, token, now)?;
        self.distributor.ensure_payable(token, pending, now)?;
        assets.transfer(&[Transfer::transfer_out(token.clone(), caller.clone(), pending)])?;

        self.distributor.settle_owner(caller, now);
        let paid = self.distributor.take_unclaimed(caller, token);
        info!(%caller, %token, amount = paid, "claimed rewards");
        Ok(paid)
    }

    fn claim_all_rewards<A: AssetLedger>(
        &mut self,
        assets: &mut A,
        caller: &AccountId,
        now: Timestamp,
    ) -> Result<Vec<(AssetId, Balance)>, VenftError> {
        let pending = self.distributor.pending_all(caller, now);
        let mut legs = Vec::with_capacity(pending.len());
        for (token, amount) in &pending {
            self.distributor.ensure_payable(token, *amount, now)?;
            legs.push(Transfer::transfer_out(token.clone(), caller.clone(), *amount));
        }
        assets.transfer(&legs)?;

        self.distributor.settle_owner(caller, now);
        let paid: Vec<(AssetId, Balance)> = pending
            .into_iter()
            .map(|(token, _)| {
                let amount = self.distributor.take_unclaimed(caller, &token);
                (token, amount)
            })
            .collect();
        info!(%caller, tokens = paid.len(), "claimed all rewards");
        Ok(paid)
    }

    fn add_reward_token(
        &mut self,
        caller: &AccountId,
        token: &AssetId,
        rate: Balance,
        now: Timestamp,
    ) -> Result<(), VenftError> {
        self.require_admin(caller)?;
        self.distributor.add_token(token.clone(), rate, now)?;
        info!(%token, rate, "registered reward token");
        Ok(())
    }

    fn add_rewards<A: AssetLedger>(
        &mut self,
        assets: &mut A,
        caller: &AccountId,
        token: &AssetId,
        amount: Balance,
        now: Timestamp,
    ) -> Result<(), VenftError> {
        if amount == 0 {
            return Err(VenftError::InvalidAmount);
        }
        self.distributor.token(token)?;
        assets.transfer(&[Transfer::transfer_in(token.clone(), caller.clone(), amount)])?;

        self.distributor.fund(token, amount, now)?;
        info!(%caller, %token, amount, "funded rewards");
        Ok(())
    }

    fn set_reward_rate(
        &mut self,
        caller: &AccountId,
        token: &AssetId,
        rate: Balance,
        now: Timestamp,
    ) -> Result<(), VenftError> {
        self.require_admin(caller)?;
        let old = self.distributor.token(token)?.rate;

        self.distributor.set_rate(token, rate, now)?;
        info!(%token, old, new = rate, "set reward rate");
        Ok(())
    }

    fn update_global_ve_power(&mut self, now: Timestamp) -> Balance {
        self.registry.checkpoint(now);
        self.distributor.checkpoint(now);
        let total = self.distributor.total_power_at(now);
        info!(now, total, "updated global ve power");
        total
    }

    fn describe(&self, lock: &Lock, now: Timestamp) -> (LockId, Lock, Balance) {
        (lock.id, lock.clone(), lock.power_at(now))
    }
}

// ── StateEngine ───────────────────────────────────────────────────────────────

struct Inner<A, C> {
    state: LedgerState,
    assets: A,
    clock: C,
}

/// The single-writer ledger.
///
/// Every mutating call takes the one lock, reads the clock, validates, moves
/// assets and only then touches ledger state, so a failed call leaves both
/// the ledger and the asset ledger exactly as they were.
pub struct StateEngine<A, C> {
    inner: Mutex<Inner<A, C>>,
}

impl<A: AssetLedger, C: Clock> StateEngine<A, C> {
    pub fn new(admin: AccountId, deposit_asset: AssetId, assets: A, clock: C) -> Self {
        let now = clock.now();
        Self::from_snapshot(LedgerState::new(admin, deposit_asset, now), assets, clock)
    }

    /// Resume from a persisted ledger.
    pub fn from_snapshot(state: LedgerState, assets: A, clock: C) -> Self {
        Self {
            inner: Mutex::new(Inner { state, assets, clock }),
        }
    }

    pub fn snapshot(&self) -> LedgerState {
        self.inner.lock().state.clone()
    }

    pub fn with_assets<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock().assets)
    }

    /// Direct access to the asset ledger, bypassing the escrow. For seeding
    /// balances outside of any ledger operation.
    pub fn with_assets_mut<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.lock().assets)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    fn write<T>(
        &self,
        f: impl FnOnce(&mut LedgerState, &mut A, Timestamp) -> Result<T, VenftError>,
    ) -> Result<T, VenftError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = inner.clock.now();
        let last = inner.state.last_now;
        if now < last {
            return Err(VenftError::ClockRegression { now, last });
        }
        let out = f(&mut inner.state, &mut inner.assets, now)?;
        inner.state.last_now = now;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState, Timestamp) -> T) -> T {
        let inner = self.inner.lock();
        let now = inner.clock.now().max(inner.state.last_now);
        f(&inner.state, now)
    }

    /// Dispatch an operation on behalf of `caller`.
    pub fn apply(&self, caller: &AccountId, op: &Operation) -> Result<Outcome, VenftError> {
        match op {
            Operation::CreateLock { amount, duration } => {
                self.create_lock(caller, *amount, *duration).map(Outcome::LockCreated)
            }
            Operation::ExtendLock { lock_id, extra_duration } => self
                .extend_lock(caller, *lock_id, *extra_duration)
                .map(|minted| Outcome::LockReplaced { burned: vec![*lock_id], minted }),
            Operation::MergeLocks { first, second } => self
                .merge_locks(caller, *first, *second)
                .map(|minted| Outcome::LockReplaced { burned: vec![*first, *second], minted }),
            Operation::Withdraw { lock_id } => self
                .withdraw(caller, *lock_id)
                .map(|amount| Outcome::Withdrawn { lock_id: *lock_id, amount }),
            Operation::TransferLock { lock_id, to } => self
                .transfer_lock(caller, *lock_id, to)
                .map(|()| Outcome::Transferred { lock_id: *lock_id, to: to.clone() }),
            Operation::Stake { lock_id } => self.stake(caller, *lock_id).map(|()| Outcome::Staked(*lock_id)),
            Operation::Unstake { lock_id } => {
                self.unstake(caller, *lock_id).map(|()| Outcome::Unstaked(*lock_id))
            }
            Operation::ClaimRewards { token } => self
                .claim_rewards(caller, token)
                .map(|amount| Outcome::Claimed(vec![(token.clone(), amount)])),
            Operation::ClaimAllRewards => self.claim_all_rewards(caller).map(Outcome::Claimed),
            Operation::AddRewardToken { token, rate } => {
                self.add_reward_token(caller, token, *rate).map(|()| Outcome::RewardsUpdated)
            }
            Operation::AddRewards { token, amount } => {
                self.add_rewards(caller, token, *amount).map(|()| Outcome::RewardsUpdated)
            }
            Operation::SetRewardRate { token, rate } => {
                self.set_reward_rate(caller, token, *rate).map(|()| Outcome::RewardsUpdated)
            }
            Operation::UpdateGlobalVePower => self
                .update_global_ve_power()
                .map(|total_power| Outcome::Checkpointed { total_power }),
        }
    }

    // ── Locks ─────────────────────────────────────────────────────────────────

    pub fn create_lock(&self, caller: &AccountId, amount: Balance, duration: Seconds) -> Result<LockId, VenftError> {
        self.write(|state, assets, now| state.create_lock(assets, caller, amount, duration, now))
    }

    pub fn extend_lock(&self, caller: &AccountId, id: LockId, extra: Seconds) -> Result<LockId, VenftError> {
        self.write(|state, _, now| state.extend_lock(caller, id, extra, now))
    }

    pub fn merge_locks(&self, caller: &AccountId, first: LockId, second: LockId) -> Result<LockId, VenftError> {
        self.write(|state, _, now| state.merge_locks(caller, first, second, now))
    }

    pub fn withdraw(&self, caller: &AccountId, id: LockId) -> Result<Balance, VenftError> {
        self.write(|state, assets, now| state.withdraw(assets, caller, id, now))
    }

    pub fn transfer_lock(&self, caller: &AccountId, id: LockId, to: &AccountId) -> Result<(), VenftError> {
        self.write(|state, _, now| state.transfer_lock(caller, id, to, now))
    }

    pub fn preview_create_lock(&self, amount: Balance, duration: Seconds) -> Result<Balance, VenftError> {
        LockRegistry::preview_create(amount, duration)
    }

    pub fn preview_extend_lock(&self, id: LockId, extra: Seconds) -> Result<Balance, VenftError> {
        self.read(|state, now| state.registry.preview_extend(id, extra, now))
    }

    pub fn preview_merge_locks(&self, first: LockId, second: LockId) -> Result<MergePreview, VenftError> {
        self.read(|state, now| state.registry.preview_merge(first, second, now))
    }

    pub fn get_lock_info(&self, id: LockId) -> Result<(Lock, Balance), VenftError> {
        self.read(|state, now| {
            let lock = state.registry.get(id)?;
            Ok((lock.clone(), lock.power_at(now)))
        })
    }

    pub fn get_tokens_of_owner(&self, owner: &AccountId) -> Vec<LockId> {
        self.read(|state, _| state.registry.tokens_of(owner))
    }

    pub fn get_all_user_nfts(&self, owner: &AccountId) -> Vec<(LockId, Lock, Balance)> {
        self.read(|state, now| {
            state
                .registry
                .locks_of(owner)
                .map(|lock| state.describe(lock, now))
                .collect()
        })
    }

    /// Σ power of every lock `owner` holds, staked or not.
    pub fn get_total_ve_power_for_owner(&self, owner: &AccountId) -> Balance {
        self.read(|state, now| state.registry.owner_power(owner, now))
    }

    /// Σ power of every live lock.
    pub fn total_power_now(&self) -> Balance {
        self.read(|state, now| state.registry.total_power_at(now))
    }

    /// Aggregate line of every live lock, projected to now.
    pub fn global_power_info(&self) -> GlobalPowerInfo {
        self.read(|state, now| state.registry.info_at(now))
    }

    // ── Staking ───────────────────────────────────────────────────────────────

    pub fn stake(&self, caller: &AccountId, id: LockId) -> Result<(), VenftError> {
        self.write(|state, _, now| state.stake(caller, id, now))
    }

    pub fn unstake(&self, caller: &AccountId, id: LockId) -> Result<(), VenftError> {
        self.write(|state, _, now| state.unstake(caller, id, now))
    }

    pub fn staker_of(&self, id: LockId) -> Option<AccountId> {
        self.read(|state, _| state.stakes.staker_of(id).cloned())
    }

    pub fn get_staked_positions(&self, owner: &AccountId) -> Vec<(LockId, Lock, Balance)> {
        self.read(|state, now| {
            state
                .stakes
                .positions_of(owner)
                .into_iter()
                .filter_map(|id| state.registry.get(id).ok())
                .map(|lock| state.describe(lock, now))
                .collect()
        })
    }

    // ── Rewards ───────────────────────────────────────────────────────────────

    pub fn claim_rewards(&self, caller: &AccountId, token: &AssetId) -> Result<Balance, VenftError> {
        self.write(|state, assets, now| state.claim_rewards(assets, caller, token, now))
    }

    pub fn claim_all_rewards(&self, caller: &AccountId) -> Result<Vec<(AssetId, Balance)>, VenftError> {
        self.write(|state, assets, now| state.claim_all_rewards(assets, caller, now))
    }

    pub fn add_reward_token(&self, caller: &AccountId, token: &AssetId, rate: Balance) -> Result<(), VenftError> {
        self.write(|state, _, now| state.add_reward_token(caller, token, rate, now))
    }

    pub fn add_rewards(&self, caller: &AccountId, token: &AssetId, amount: Balance) -> Result<(), VenftError> {
        self.write(|state, assets, now| state.add_rewards(assets, caller, token, amount, now))
    }

    pub fn set_reward_rate(&self, caller: &AccountId, token: &AssetId, rate: Balance) -> Result<(), VenftError> {
        self.write(|state, _, now| state.set_reward_rate(caller, token, rate, now))
    }

    pub fn update_global_ve_power(&self) -> Result<Balance, VenftError> {
        self.write(|state, _, now| Ok(state.update_global_ve_power(now)))
    }

    pub fn pending_rewards(&self, owner: &AccountId, token: &AssetId) -> Result<Balance, VenftError> {
        self.read(|state, now| state.distributor.pending(owner, token, now))
    }

    pub fn get_reward_token_info(&self, token: &AssetId) -> Result<RewardTokenEntry, VenftError> {
        self.read(|state, now| state.distributor.token_info(token, now))
    }

    pub fn reward_tokens(&self) -> Vec<AssetId> {
        self.read(|state, _| state.distributor.tokens().cloned().collect())
    }

    /// Σ power of the locks `owner` has staked.
    pub fn calculate_current_user_ve_power(&self, owner: &AccountId) -> Balance {
        self.read(|state, now| {
            state
                .stakes
                .positions_of(owner)
                .into_iter()
                .filter_map(|id| state.registry.get(id).ok())
                .map(|lock| lock.power_at(now))
                .sum()
        })
    }

    /// Σ power of every staked lock.
    pub fn calculate_current_total_ve_power(&self) -> Balance {
        self.read(|state, now| state.distributor.total_power_at(now))
    }

    /// Staked aggregate line, projected to now.
    pub fn get_global_ve_power_info(&self) -> GlobalPowerInfo {
        self.read(|state, now| state.distributor.info_at(now))
    }

    // ── Misc ──────────────────────────────────────────────────────────────────

    pub fn now(&self) -> Timestamp {
        self.read(|_, now| now)
    }

    pub fn admin(&self) -> AccountId {
        self.read(|state, _| state.admin.clone())
    }

    pub fn deposit_asset(&self) -> AssetId {
        self.read(|state, _| state.deposit_asset.clone())
    }

    pub fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Balance {
        self.with_assets(|assets| assets.balance_of(asset, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryAssetLedger;
    use crate::clock::ManualClock;
    use venft_core::constants::MAX_LOCK_DURATION;

    const UNIT: Balance = 10u128.pow(18);
    const T0: Timestamp = 1_700_000_000;

    fn setup() -> (StateEngine<InMemoryAssetLedger, ManualClock>, ManualClock, AccountId) {
        let clock = ManualClock::new(T0);
        let alice = AccountId::from_label("alice");
        let engine = StateEngine::new(
            AccountId::from_label("admin"),
            AssetId::new("LP"),
            InMemoryAssetLedger::new(),
            clock.clone(),
        );
        engine.with_assets_mut(|a| a.mint(&AssetId::new("LP"), &alice, 1_000 * UNIT));
        (engine, clock, alice)
    }

    #[test]
    fn clock_regression_is_rejected_before_anything_changes() {
        let (engine, clock, alice) = setup();
        engine.create_lock(&alice, UNIT, MAX_LOCK_DURATION).unwrap();
        let before = engine.snapshot();
        clock.set(T0 - 1);
        assert_eq!(
            engine.create_lock(&alice, UNIT, MAX_LOCK_DURATION),
            Err(VenftError::ClockRegression { now: T0 - 1, last: T0 })
        );
        assert_eq!(engine.snapshot(), before);
        // Reads still see the last committed time.
        assert_eq!(engine.now(), T0);
    }

    #[test]
    fn apply_dispatches_to_typed_methods() {
        let (engine, _, alice) = setup();
        let out = engine
            .apply(&alice, &Operation::CreateLock { amount: UNIT, duration: 86_400 })
            .unwrap();
        assert_eq!(out, Outcome::LockCreated(LockId(1)));
        let out = engine
            .apply(&alice, &Operation::ExtendLock { lock_id: LockId(1), extra_duration: 86_400 })
            .unwrap();
        assert_eq!(out, Outcome::LockReplaced { burned: vec![LockId(1)], minted: LockId(2) });
        let out = engine.apply(&alice, &Operation::UpdateGlobalVePower).unwrap();
        assert_eq!(out, Outcome::Checkpointed { total_power: 0 });
    }

    #[test]
    fn failed_deposit_mints_nothing() {
        let (engine, _, alice) = setup();
        let err = engine.create_lock(&alice, 2_000 * UNIT, 86_400).unwrap_err();
        assert!(matches!(err, VenftError::InsufficientBalance { .. }));
        assert!(engine.get_tokens_of_owner(&alice).is_empty());
        // The id counter did not move either.
        assert_eq!(engine.create_lock(&alice, UNIT, 86_400).unwrap(), LockId(1));
    }
}
