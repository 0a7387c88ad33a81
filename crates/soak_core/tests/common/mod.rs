//! Shared helpers for integration tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use soak_core::{LeaderInfo, MemStore, StoreError, StoreHandle};

/// Store wrapper that fails the first `fail_first` calls across all
/// operations, then delegates to the in-memory engine.
pub struct FlakyStore {
    inner: MemStore,
    fail_first: u64,
    calls: AtomicU64,
    /// When set, successful deletes do not report rows affected.
    pub hide_rows_affected: bool,
}

impl FlakyStore {
    pub fn failing(fail_first: u64) -> Self {
        Self {
            inner: MemStore::new(),
            fail_first,
            calls: AtomicU64::new(0),
            hide_rows_affected: false,
        }
    }

    /// A store where every call fails.
    pub fn always_failing() -> Self {
        Self::failing(u64::MAX)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> usize {
        self.inner.len()
    }

    fn gate(&self) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(StoreError::Unavailable(format!("injected failure {call}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreHandle for FlakyStore {
    async fn upsert(&self, key: i64, value: &str) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.upsert(key, value).await
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.gate()?;
        self.inner.count().await
    }

    async fn delete_below(&self, threshold: i64) -> Result<Option<u64>, StoreError> {
        self.gate()?;
        let rows = self.inner.delete_below(threshold).await?;
        Ok(if self.hide_rows_affected { None } else { rows })
    }

    async fn leader_info(&self) -> Result<LeaderInfo, StoreError> {
        self.inner.leader_info().await
    }
}
