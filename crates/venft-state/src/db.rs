use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use venft_core::error::VenftError;
use venft_core::operation::OpRecord;

use crate::engine::LedgerState;

const LEDGER_KEY: &str = "ledger";

/// Persistent ledger storage backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   meta   - utf8 key bytes → bincode value (the ledger snapshot, asset balances)
///   oplog  - big-endian seq → bincode(OpRecord)
pub struct StateDb {
    db: sled::Db,
    meta: sled::Tree,
    oplog: sled::Tree,
}

fn storage(e: sled::Error) -> VenftError {
    VenftError::Storage(e.to_string())
}

fn serialization(e: bincode::Error) -> VenftError {
    VenftError::Serialization(e.to_string())
}

impl StateDb {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VenftError> {
        let db = sled::open(path).map_err(storage)?;
        let meta = db.open_tree("meta").map_err(storage)?;
        let oplog = db.open_tree("oplog").map_err(storage)?;
        Ok(Self { db, meta, oplog })
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn put_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<(), VenftError> {
        let bytes = bincode::serialize(value).map_err(serialization)?;
        self.meta.insert(key.as_bytes(), bytes).map_err(storage)?;
        Ok(())
    }

    pub fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, VenftError> {
        match self.meta.get(key.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    pub fn put_ledger(&self, state: &LedgerState) -> Result<(), VenftError> {
        self.put_meta(LEDGER_KEY, state)
    }

    pub fn get_ledger(&self) -> Result<Option<LedgerState>, VenftError> {
        self.get_meta(LEDGER_KEY)
    }

    // ── Operation log ─────────────────────────────────────────────────────────

    pub fn append_op(&self, record: &OpRecord) -> Result<(), VenftError> {
        let bytes = bincode::serialize(record).map_err(serialization)?;
        self.oplog
            .insert(record.seq.to_be_bytes(), bytes)
            .map_err(storage)?;
        Ok(())
    }

    /// Sequence number of the newest logged operation.
    pub fn last_seq(&self) -> Result<Option<u64>, VenftError> {
        match self.oplog.last().map_err(storage)? {
            Some((key, _)) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&key);
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Every logged operation, in sequence order.
    pub fn ops(&self) -> Result<Vec<OpRecord>, VenftError> {
        let mut out = Vec::new();
        for item in self.oplog.iter() {
            let (_, bytes) = item.map_err(storage)?;
            out.push(bincode::deserialize(&bytes).map_err(serialization)?);
        }
        Ok(out)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), VenftError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venft_core::operation::Operation;
    use venft_core::types::{AccountId, AssetId, LockId};

    #[test]
    fn oplog_is_ordered_by_seq() {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        assert_eq!(db.last_seq().unwrap(), None);

        for seq in [2u64, 1, 300] {
            db.append_op(&OpRecord {
                seq,
                at: 1_000 + seq,
                caller: AccountId::from_label("alice"),
                op: Operation::Stake { lock_id: LockId(seq) },
            })
            .unwrap();
        }
        let seqs: Vec<u64> = db.ops().unwrap().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 300]);
        assert_eq!(db.last_seq().unwrap(), Some(300));
    }

    #[test]
    fn ledger_snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let state = LedgerState::new(AccountId::from_label("admin"), AssetId::new("LP"), 42);
        {
            let db = StateDb::open(dir.path()).unwrap();
            assert!(db.get_ledger().unwrap().is_none());
            db.put_ledger(&state).unwrap();
            db.flush().unwrap();
        }
        let db = StateDb::open(dir.path()).unwrap();
        assert_eq!(db.get_ledger().unwrap(), Some(state));
    }
}
