//! venft-genesis
//!
//! Builds the opening ledger from a [`GenesisParams`] document. Genesis is
//! the one place balances are created: deposit and reward assets are minted
//! straight into the in-memory asset ledger, then every reward token is
//! registered and funded through the normal admin operations, so the
//! resulting state is indistinguishable from one reached by replaying those
//! calls.

pub mod params;

pub use params::{GenesisBalance, GenesisParams, GenesisRewardToken};

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::info;

use venft_core::error::VenftError;
use venft_core::types::{AccountId, AssetId};
use venft_state::{Clock, InMemoryAssetLedger, StateEngine};

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("genesis document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reward token {0} listed twice")]
    DuplicateRewardToken(AssetId),

    #[error("reward token {0} is the deposit asset")]
    DepositAssetAsReward(AssetId),

    #[error("genesis balance for {account} is zero")]
    ZeroBalance { account: String },

    #[error(transparent)]
    Ledger(#[from] VenftError),
}

/// Check the document before anything is minted.
pub fn validate(params: &GenesisParams) -> Result<(), GenesisError> {
    for b in &params.balances {
        if b.amount == 0 {
            return Err(GenesisError::ZeroBalance { account: b.account.clone() });
        }
    }
    let mut seen = BTreeSet::new();
    for t in &params.reward_tokens {
        if t.token == params.deposit_asset {
            return Err(GenesisError::DepositAssetAsReward(t.token.clone()));
        }
        if !seen.insert(&t.token) {
            return Err(GenesisError::DuplicateRewardToken(t.token.clone()));
        }
    }
    Ok(())
}

/// Build the genesis ledger on top of `clock`.
pub fn apply_genesis<C: Clock>(
    params: &GenesisParams,
    clock: C,
) -> Result<StateEngine<InMemoryAssetLedger, C>, GenesisError> {
    validate(params)?;
    info!(
        admin = %params.admin,
        deposit_asset = %params.deposit_asset,
        "applying veNFT genesis"
    );

    let admin = AccountId::from_label(&params.admin);
    let mut assets = InMemoryAssetLedger::new();

    // ── 1. Opening balances ──────────────────────────────────────────────────
    for b in &params.balances {
        assets.mint(&b.asset, &AccountId::from_label(&b.account), b.amount);
        info!(account = %b.account, asset = %b.asset, amount = b.amount, "genesis: balance");
    }

    // ── 2. Reward tokens ─────────────────────────────────────────────────────
    for t in &params.reward_tokens {
        if t.funding > 0 {
            assets.mint(&t.token, &admin, t.funding);
        }
    }

    let engine = StateEngine::new(admin.clone(), params.deposit_asset.clone(), assets, clock);
    for t in &params.reward_tokens {
        engine.add_reward_token(&admin, &t.token, t.rate)?;
        if t.funding > 0 {
            engine.add_rewards(&admin, &t.token, t.funding)?;
        }
        info!(token = %t.token, rate = t.rate, funding = t.funding, "genesis: reward token");
    }

    Ok(engine)
}

/// Parse and apply a JSON genesis document.
pub fn genesis_from_json<C: Clock>(
    json: &str,
    clock: C,
) -> Result<StateEngine<InMemoryAssetLedger, C>, GenesisError> {
    apply_genesis(&GenesisParams::from_json(json)?, clock)
}
