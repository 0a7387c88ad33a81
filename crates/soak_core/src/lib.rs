//! Core building blocks for the soak harness: a retry-governed fleet of
//! runners issuing writes, reads, and range deletes against a
//! single-writer replicated SQL store, plus leader resolution for the
//! local process.

pub mod clock;
pub mod config;
pub mod leader;
pub mod ops;
pub mod pg_store;
pub mod retry;
pub mod runner;
pub mod stats;
pub mod store;

pub use config::{HarnessConfig, Profile};
pub use leader::{is_local_leader, resolve_leader, LeaderError};
pub use ops::{OpExecutor, OpKind, OpOutcome, OpProfile};
pub use pg_store::{PgStore, PoolConfig};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use runner::{Runner, RunnerId};
pub use stats::{HarnessStats, StatsSnapshot};
pub use store::{LeaderInfo, MemStore, StoreError, StoreHandle};
