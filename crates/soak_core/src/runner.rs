//! Long-lived per-client tick loops.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ops::{OpExecutor, OpKind, OpProfile};
use crate::stats::HarnessStats;

/// Opaque label for one logical client. Observability only; created at
/// spawn and never reused concurrently by two live runners.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunnerId(String);

impl RunnerId {
    pub fn new(kind: OpKind, index: usize) -> Self {
        Self(format!("{kind}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical client driving a single operation kind until shutdown.
///
/// Runners share nothing but the store handle and the counters.
pub struct Runner {
    id: RunnerId,
    kind: OpKind,
    profile: OpProfile,
    executor: OpExecutor,
    stats: Arc<HarnessStats>,
}

impl Runner {
    pub fn new(
        id: RunnerId,
        kind: OpKind,
        profile: OpProfile,
        executor: OpExecutor,
        stats: Arc<HarnessStats>,
    ) -> Self {
        Self {
            id,
            kind,
            profile,
            executor,
            stats,
        }
    }

    /// Spawn the tick loop.
    ///
    /// Ticks that fire while an invocation is in flight are skipped, not
    /// queued; a handler slower than the tick period degrades the
    /// effective invocation rate to handler latency. Exhaustion and
    /// deadline failures are recoverable: they are logged, counted, and
    /// the loop proceeds to the next tick. Cancellation stops scheduling
    /// new ticks and lets the in-flight invocation finish.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.profile.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately; consume it so
            // invocations start one period after spawn.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match self
                    .executor
                    .execute(self.kind, &self.profile, &self.id)
                    .await
                {
                    Ok(_) => self.stats.record_ok(self.kind),
                    Err(err) => {
                        self.stats.record_failure(self.kind);
                        error!(
                            runner = %self.id,
                            op = %self.kind,
                            attempts = err.attempts(),
                            error = %err,
                            "invocation failed"
                        );
                    }
                }
            }
            info!(runner = %self.id, "runner stopped");
        })
    }
}
