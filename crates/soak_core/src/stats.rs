//! Shared invocation counters.
//!
//! Counters are best-effort and process-local: failures here are whole
//! invocations (retries exhausted or deadline passed), not individual
//! attempts. Sustained write failures indicate the store is unreachable
//! or has no leader.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::ops::OpKind;

/// Point-in-time view of the counters.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StatsSnapshot {
    pub write_ok: u64,
    pub write_failed: u64,
    pub read_ok: u64,
    pub read_failed: u64,
    pub delete_ok: u64,
    pub delete_failed: u64,
}

impl StatsSnapshot {
    pub fn total_failed(&self) -> u64 {
        self.write_failed + self.read_failed + self.delete_failed
    }
}

/// Per-kind success/failure counters shared by every runner.
#[derive(Debug, Default)]
pub struct HarnessStats {
    ok_ops: [AtomicU64; 3],
    failed_ops: [AtomicU64; 3],
}

impl HarnessStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ok(&self, kind: OpKind) {
        self.ok_ops[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: OpKind) {
        self.failed_ops[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let ok = |kind: OpKind| self.ok_ops[kind as usize].load(Ordering::Relaxed);
        let failed = |kind: OpKind| self.failed_ops[kind as usize].load(Ordering::Relaxed);
        StatsSnapshot {
            write_ok: ok(OpKind::Write),
            write_failed: failed(OpKind::Write),
            read_ok: ok(OpKind::Read),
            read_failed: failed(OpKind::Read),
            delete_ok: ok(OpKind::Delete),
            delete_failed: failed(OpKind::Delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_outcomes() {
        let stats = HarnessStats::new();
        stats.record_ok(OpKind::Write);
        stats.record_ok(OpKind::Write);
        stats.record_failure(OpKind::Read);
        stats.record_failure(OpKind::Delete);

        let snap = stats.snapshot();
        assert_eq!(snap.write_ok, 2);
        assert_eq!(snap.write_failed, 0);
        assert_eq!(snap.read_failed, 1);
        assert_eq!(snap.delete_failed, 1);
        assert_eq!(snap.total_failed(), 2);
    }
}
