#![allow(dead_code)]

use venft_core::types::{AccountId, AssetId, Balance, Timestamp};
use venft_state::{InMemoryAssetLedger, ManualClock, StateEngine};

pub const UNIT: Balance = 1_000_000_000_000_000_000;
pub const T0: Timestamp = 1_700_000_000;
pub const DAY: u64 = 86_400;

pub type Engine = StateEngine<InMemoryAssetLedger, ManualClock>;

pub struct Fixture {
    pub engine: Engine,
    pub clock: ManualClock,
    pub admin: AccountId,
}

pub fn lp() -> AssetId {
    AssetId::new("LP")
}

pub fn rwd() -> AssetId {
    AssetId::new("RWD")
}

pub fn account(label: &str) -> AccountId {
    AccountId::from_label(label)
}

impl Fixture {
    /// A fresh ledger at `T0`. The admin holds plenty of `RWD`.
    pub fn new() -> Self {
        let clock = ManualClock::new(T0);
        let admin = account("admin");
        let engine = StateEngine::new(admin.clone(), lp(), InMemoryAssetLedger::new(), clock.clone());
        engine.with_assets_mut(|a| a.mint(&rwd(), &admin, 1_000_000_000 * UNIT));
        Self { engine, clock, admin }
    }

    /// Registers `RWD` at `rate` per second and funds it generously.
    pub fn with_rewards(rate: Balance) -> Self {
        let fx = Self::new();
        fx.engine.add_reward_token(&fx.admin, &rwd(), rate).unwrap();
        fx.engine.add_rewards(&fx.admin, &rwd(), 100_000_000 * UNIT).unwrap();
        fx
    }

    /// An account holding `lp_units` whole LP tokens.
    pub fn user(&self, label: &str, lp_units: Balance) -> AccountId {
        let id = account(label);
        self.engine.with_assets_mut(|a| a.mint(&lp(), &id, lp_units * UNIT));
        id
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(secs);
    }
}

/// |a - b| <= tolerance * max(a, b), with tolerance in parts per million.
pub fn close(a: Balance, b: Balance, ppm: u128) -> bool {
    let hi = a.max(b);
    a.abs_diff(b) * 1_000_000 <= hi * ppm
}
