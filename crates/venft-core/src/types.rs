use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{ESCROW_ACCOUNT_LABEL, TOKEN_NAME_PREFIX};
use crate::error::VenftError;

/// Amount in base units of an asset.
pub type Balance = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = u64;

/// A span of time in seconds.
pub type Seconds = u64;

// ── AccountId ────────────────────────────────────────────────────────────────

/// 32-byte account identifier. Accounts are owned by the surrounding system;
/// the ledger only compares them. Serialized as its base-58 string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Deterministic id for a human-readable label: BLAKE3(label).
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// The custody account holding escrowed deposits and reward funds.
    pub fn escrow() -> Self {
        Self::from_label(ESCROW_ACCOUNT_LABEL)
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, VenftError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| VenftError::InvalidAccountId(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VenftError::InvalidAccountId(format!("{s}: expected 32 bytes")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl TryFrom<String> for AccountId {
    type Error = VenftError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_b58(&s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> String {
        id.to_b58()
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_b58()[..8])
    }
}

// ── AssetId ──────────────────────────────────────────────────────────────────

/// Identifier of a fungible asset on the external ledger (the deposit asset
/// or a reward token).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

// ── LockId ───────────────────────────────────────────────────────────────────

/// Lock (veNFT) identifier. Assigned from a monotonic counter starting at 1
/// and never reused, even after the lock is burned.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct LockId(pub u64);

impl LockId {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", TOKEN_NAME_PREFIX, self.0)
    }
}
