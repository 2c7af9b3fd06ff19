//! venft-query
//!
//! Read-side helpers over a `StateEngine`: lock descriptions, token-URI
//! metadata, unlock schedules and reward runway. Nothing here mutates the
//! ledger; every call is a projection at the engine's current time.

pub mod query;
pub mod schedule;

pub use query::{Attribute, LockMetadata, LockQuery};
pub use schedule::{reward_runway, unlock_schedule, RewardRunway, Unlock};
