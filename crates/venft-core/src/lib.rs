pub mod aggregate;
pub mod constants;
pub mod decay;
pub mod error;
pub mod lock;
pub mod math;
pub mod operation;
pub mod reward;
pub mod types;

pub use aggregate::{GlobalPowerInfo, PowerAggregate, PowerLine};
pub use constants::*;
pub use decay::{duration_for_power, ve_power};
pub use error::VenftError;
pub use lock::{Lock, MergePreview};
pub use math::U256;
pub use operation::{OpRecord, Operation, Outcome};
pub use reward::{AccPair, OwnerReward, RewardTokenEntry};
pub use types::*;
