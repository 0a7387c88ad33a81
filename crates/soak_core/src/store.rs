//! Store-handle boundary: the opaque pooled session the harness drives.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

/// Leadership descriptor returned by the cluster: node id plus the
/// leader's advertised address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderInfo {
    pub node_id: u64,
    pub address: String,
}

/// Failure of a single store call. Every variant is transient from the
/// harness's point of view and feeds the next retry decision.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sql error: {0}")]
    Sql(#[from] tokio_postgres::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Long-lived session to the clustered store, shared by every runner.
///
/// Implementations must be safe for unsynchronized concurrent use from
/// arbitrarily many runners; connection pooling is theirs to manage.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Insert-or-replace one row of the `model` table.
    async fn upsert(&self, key: i64, value: &str) -> Result<(), StoreError>;

    /// Scalar row count over the `model` table.
    async fn count(&self) -> Result<i64, StoreError>;

    /// Delete every row with `key < threshold`. Returns the affected-row
    /// count when the store reports one; `None` is not an error.
    async fn delete_below(&self, threshold: i64) -> Result<Option<u64>, StoreError>;

    /// The cluster's current leader. Staleness is expected; callers fetch
    /// fresh on every check.
    async fn leader_info(&self) -> Result<LeaderInfo, StoreError>;
}

fn lock_poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

/// In-memory single-node engine with the same table semantics.
///
/// Backs the integration tests and `soak-drill --embedded` smoke runs.
#[derive(Debug)]
pub struct MemStore {
    rows: RwLock<BTreeMap<i64, String>>,
    leader: LeaderInfo,
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_leader(LeaderInfo {
            node_id: 1,
            address: "127.0.0.1:0".to_string(),
        })
    }

    pub fn with_leader(leader: LeaderInfo) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            leader,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreHandle for MemStore {
    async fn upsert(&self, key: i64, value: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| lock_poisoned())?;
        rows.insert(key, value.to_string());
        Ok(())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let rows = self.rows.read().map_err(|_| lock_poisoned())?;
        Ok(rows.len() as i64)
    }

    async fn delete_below(&self, threshold: i64) -> Result<Option<u64>, StoreError> {
        let mut rows = self.rows.write().map_err(|_| lock_poisoned())?;
        // split_off keeps `>= threshold` in the returned map.
        let kept = rows.split_off(&threshold);
        let removed = rows.len() as u64;
        *rows = kept;
        Ok(Some(removed))
    }

    async fn leader_info(&self) -> Result<LeaderInfo, StoreError> {
        Ok(self.leader.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_by_key_replaces_instead_of_duplicating() {
        let store = MemStore::new();
        store.upsert(7, "first").await.unwrap();
        store.upsert(7, "second").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_below_is_strictly_less_than() {
        let store = MemStore::new();
        for key in [1i64, 2, 3, 4, 5] {
            store.upsert(key, "v").await.unwrap();
        }
        let removed = store.delete_below(4).await.unwrap();
        assert_eq!(removed, Some(3));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_on_empty_table_reports_zero_rows() {
        let store = MemStore::new();
        assert_eq!(store.delete_below(i64::MAX).await.unwrap(), Some(0));
    }
}
