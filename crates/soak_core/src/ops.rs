//! The three operation kinds, each executed as one deadline-bounded retry
//! sequence against the store handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock;
use crate::retry::{Backoff, RetryError, RetryPolicy};
use crate::runner::RunnerId;
use crate::store::{StoreError, StoreHandle};

/// Placeholder payload written by every upsert.
const WRITE_VALUE: &str = "anyvalue";

/// Operation kinds driven by the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Write,
    Read,
    Delete,
}

impl OpKind {
    pub const ALL: [OpKind; 3] = [OpKind::Write, OpKind::Read, OpKind::Delete];

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Write => "write",
            OpKind::Read => "read",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-kind schedule and retry tuning. Write, read, and delete tolerances
/// differ, so each kind carries its own budget and backoff pair.
#[derive(Clone, Copy, Debug)]
pub struct OpProfile {
    /// Fixed period between invocation triggers.
    pub tick: Duration,
    /// Wall-clock budget for one invocation's whole retry sequence.
    pub budget: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl OpProfile {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

/// What one successful invocation did.
#[derive(Clone, Debug)]
pub struct OpOutcome {
    pub kind: OpKind,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Rows removed by a delete, when the store reported a count.
    pub rows_affected: Option<u64>,
    /// Row count observed by a read.
    pub count: Option<i64>,
}

/// Executes operations against the shared store handle.
#[derive(Clone)]
pub struct OpExecutor {
    store: Arc<dyn StoreHandle>,
}

impl OpExecutor {
    pub fn new(store: Arc<dyn StoreHandle>) -> Self {
        Self { store }
    }

    /// Run one invocation of `kind` under `profile`.
    ///
    /// The deadline is derived fresh from the profile budget, owned by this
    /// invocation, and discarded when it returns. Per-attempt failures are
    /// logged here; the final error comes back undecorated for the runner
    /// to handle.
    pub async fn execute(
        &self,
        kind: OpKind,
        profile: &OpProfile,
        runner: &RunnerId,
    ) -> Result<OpOutcome, RetryError<StoreError>> {
        let started = Instant::now();
        let deadline = started + profile.budget;
        let policy = profile.policy();
        let result = match kind {
            OpKind::Write => self.write(policy, deadline, runner).await,
            OpKind::Read => self.read(policy, deadline, runner).await,
            OpKind::Delete => self.delete(policy, deadline, runner).await,
        };
        let elapsed = started.elapsed();
        match result {
            Ok((attempts, rows_affected, count)) => {
                debug!(
                    runner = %runner,
                    op = %kind,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation complete"
                );
                Ok(OpOutcome {
                    kind,
                    attempts,
                    elapsed,
                    rows_affected,
                    count,
                })
            }
            Err(err) => {
                debug!(
                    runner = %runner,
                    op = %kind,
                    attempts = err.attempts(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation gave up"
                );
                Err(err)
            }
        }
    }

    async fn write(
        &self,
        policy: RetryPolicy,
        deadline: Instant,
        runner: &RunnerId,
    ) -> Result<(u32, Option<u64>, Option<i64>), RetryError<StoreError>> {
        // One key per invocation: every attempt upserts the same row.
        let key = clock::unix_nanos();
        policy
            .run(deadline, |attempt| async move {
                match self.store.upsert(key, WRITE_VALUE).await {
                    Ok(()) => Ok((attempt, None, None)),
                    Err(err) => {
                        warn!(runner = %runner, op = "write", attempt, error = %err, "attempt failed");
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn read(
        &self,
        policy: RetryPolicy,
        deadline: Instant,
        runner: &RunnerId,
    ) -> Result<(u32, Option<u64>, Option<i64>), RetryError<StoreError>> {
        policy
            .run(deadline, |attempt| async move {
                match self.store.count().await {
                    Ok(count) => Ok((attempt, None, Some(count))),
                    Err(err) => {
                        warn!(runner = %runner, op = "read", attempt, error = %err, "attempt failed");
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn delete(
        &self,
        policy: RetryPolicy,
        deadline: Instant,
        runner: &RunnerId,
    ) -> Result<(u32, Option<u64>, Option<i64>), RetryError<StoreError>> {
        // Threshold captured once; concurrent writes keyed at or above it
        // survive this invocation.
        let threshold = clock::unix_nanos();
        policy
            .run(deadline, |attempt| async move {
                match self.store.delete_below(threshold).await {
                    Ok(rows) => {
                        if rows.is_none() {
                            warn!(runner = %runner, op = "delete", "store did not report rows affected");
                        }
                        Ok((attempt, rows, None))
                    }
                    Err(err) => {
                        warn!(runner = %runner, op = "delete", attempt, error = %err, "attempt failed");
                        Err(err)
                    }
                }
            })
            .await
    }
}
