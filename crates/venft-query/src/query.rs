use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use venft_core::constants::{SECONDS_PER_DAY, TOKEN_DESCRIPTION, TOKEN_URI_PREFIX};
use venft_core::error::VenftError;
use venft_core::types::{LockId, Timestamp};
use venft_state::{AssetLedger, Clock, StateEngine};

/// One `{trait_type, value}` pair of the token metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// JSON metadata of a lock, as embedded in its token URI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub name: String,
    pub description: String,
    pub attributes: Vec<Attribute>,
}

impl LockMetadata {
    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

/// Query helpers for locks.
pub struct LockQuery<'a, A, C> {
    engine: &'a StateEngine<A, C>,
}

impl<'a, A: AssetLedger, C: Clock> LockQuery<'a, A, C> {
    pub fn new(engine: &'a StateEngine<A, C>) -> Self {
        Self { engine }
    }

    /// Returns true once the lock can be withdrawn (end_time <= now).
    pub fn is_matured(&self, id: LockId) -> Result<bool, VenftError> {
        let (lock, _) = self.engine.get_lock_info(id)?;
        Ok(lock.is_expired(self.engine.now()))
    }

    /// Human-readable summary of a lock's state.
    pub fn describe(&self, id: LockId) -> Result<String, VenftError> {
        let (lock, power) = self.engine.get_lock_info(id)?;
        let now = self.engine.now();

        let status = match self.engine.staker_of(id) {
            Some(staker) if lock.is_expired(now) => format!("expired, staked by {staker}"),
            Some(staker) => format!("staked by {staker}, unlocks in {} days", days(lock.remaining_at(now))),
            None if lock.is_expired(now) => "expired, ready to withdraw".to_string(),
            None => format!("unlocks in {} days", days(lock.remaining_at(now))),
        };

        Ok(format!(
            "{} | {} {} | power {} | owner: {} | {}",
            id,
            lock.amount,
            self.engine.deposit_asset(),
            power,
            lock.owner,
            status
        ))
    }

    pub fn metadata(&self, id: LockId) -> Result<LockMetadata, VenftError> {
        let (lock, power) = self.engine.get_lock_info(id)?;
        let now = self.engine.now();

        let attr = |trait_type: &str, value: String| Attribute {
            trait_type: trait_type.to_string(),
            value,
        };
        Ok(LockMetadata {
            name: id.to_string(),
            description: TOKEN_DESCRIPTION.to_string(),
            attributes: vec![
                attr("LP Amount", lock.amount.to_string()),
                attr("Lock Duration", format!("{} days", days(lock.lock_duration))),
                attr("Current VePower", format!("{power}%")),
                attr("Remaining Time", format!("{} days", days(lock.remaining_at(now)))),
                attr("End Date", end_date(lock.end_time)),
            ],
        })
    }

    /// `data:application/json;base64,` URI carrying [`LockQuery::metadata`].
    pub fn token_uri(&self, id: LockId) -> Result<String, VenftError> {
        let metadata = self.metadata(id)?;
        let json = serde_json::to_vec(&metadata)
            .map_err(|e| VenftError::Serialization(e.to_string()))?;
        Ok(format!("{}{}", TOKEN_URI_PREFIX, STANDARD.encode(json)))
    }
}

fn days(secs: u64) -> u64 {
    secs / SECONDS_PER_DAY
}

/// UTC date of `ts`, or the raw timestamp if it is out of chrono's range.
fn end_date(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use venft_core::constants::MAX_LOCK_DURATION;
    use venft_core::types::{AccountId, AssetId};
    use venft_state::{InMemoryAssetLedger, ManualClock};

    const UNIT: u128 = 10u128.pow(18);
    // 2024-01-01 00:00:00 UTC
    const T0: Timestamp = 1_704_067_200;

    fn engine() -> (StateEngine<InMemoryAssetLedger, ManualClock>, ManualClock, AccountId) {
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

    fn decode(uri: &str) -> LockMetadata {
        let b64 = uri.strip_prefix(TOKEN_URI_PREFIX).unwrap();
        serde_json::from_slice(&STANDARD.decode(b64).unwrap()).unwrap()
    }

    #[test]
    fn token_uri_reports_lock_state() {
        let (engine, clock, alice) = engine();
        let half = MAX_LOCK_DURATION / 2;
        let id = engine.create_lock(&alice, 100 * UNIT, half).unwrap();
        let q = LockQuery::new(&engine);

        let meta = decode(&q.token_uri(id).unwrap());
        assert_eq!(meta.name, "veNFT #1");
        assert_eq!(meta.description, TOKEN_DESCRIPTION);
        assert_eq!(meta.attribute("LP Amount"), Some((100 * UNIT).to_string().as_str()));
        assert_eq!(meta.attribute("Lock Duration"), Some("365 days"));
        assert_eq!(meta.attribute("Current VePower"), Some(format!("{}%", 50 * UNIT).as_str()));
        assert_eq!(meta.attribute("Remaining Time"), Some("365 days"));
        assert_eq!(meta.attribute("End Date"), Some("2024-12-31 00:00:00 UTC"));

        clock.advance(half / 2);
        let later = q.metadata(id).unwrap();
        assert_eq!(later.attribute("Remaining Time"), Some("182 days"));
        assert_eq!(later.attribute("Current VePower"), Some(format!("{}%", 25 * UNIT).as_str()));
    }

    #[test]
    fn describe_and_maturity() {
        let (engine, clock, alice) = engine();
        let id = engine.create_lock(&alice, 5 * UNIT, 10 * SECONDS_PER_DAY).unwrap();
        let q = LockQuery::new(&engine);

        assert!(!q.is_matured(id).unwrap());
        assert!(q.describe(id).unwrap().ends_with("unlocks in 10 days"));

        engine.stake(&alice, id).unwrap();
        assert!(q.describe(id).unwrap().contains("staked by"));

        clock.advance(10 * SECONDS_PER_DAY);
        assert!(q.is_matured(id).unwrap());
        engine.unstake(&alice, id).unwrap();
        assert!(q.describe(id).unwrap().ends_with("ready to withdraw"));

        engine.withdraw(&alice, id).unwrap();
        assert_eq!(q.describe(id), Err(VenftError::LockNotFound(id)));
    }
}
