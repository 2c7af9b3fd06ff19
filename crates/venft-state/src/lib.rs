pub mod assets;
pub mod clock;
pub mod db;
pub mod distributor;
pub mod engine;
pub mod registry;
pub mod stake;

pub use assets::{AssetLedger, InMemoryAssetLedger, Transfer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::StateDb;
pub use distributor::{Position, RewardDistributor};
pub use engine::{LedgerState, StateEngine};
pub use registry::LockRegistry;
pub use stake::StakeBinding;
