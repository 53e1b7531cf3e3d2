//! Lock structures shared by the storage tiers

mod keyed;
mod sharded;

pub use keyed::{KeyedGuard, KeyedLocks};
pub use sharded::{ShardedMap, DEFAULT_SHARDS};
