//! Postgres-wire `StoreHandle` backed by a small internal connection pool.
//!
//! The store exposes the `model` table over the postgres wire protocol and
//! leadership as a one-row `cluster_leader` virtual table. The pool caps
//! concurrently open sessions so a fleet of hundreds of runners cannot
//! exhaust the store; runners above the cap queue on checkout.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_postgres::{Client, NoTls};

use crate::store::{LeaderInfo, StoreError, StoreHandle};

const UPSERT_SQL: &str = "INSERT INTO model (key, value) VALUES ($1, $2) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";
const COUNT_SQL: &str = "SELECT COUNT(key)::BIGINT FROM model";
const DELETE_SQL: &str = "DELETE FROM model WHERE key < $1";
const LEADER_SQL: &str = "SELECT node_id, address FROM cluster_leader LIMIT 1";

/// One-time table bootstrap, run by the driver before starting runners.
pub const SCHEMA_SQL: &str =
    "CREATE TABLE IF NOT EXISTS model (key BIGINT NOT NULL, value TEXT, UNIQUE (key))";

/// Connection-pool tuning.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Maximum concurrently open connections.
    pub max_open: usize,
    /// Idle connections retained for reuse.
    pub max_idle: usize,
    /// Idle connections older than this are discarded on checkout.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 32,
            max_idle: 8,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// A live client plus the task driving its connection.
struct PooledConn {
    client: Client,
    driver: JoinHandle<()>,
    parked_at: Instant,
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Pooled postgres-wire session to the clustered store.
pub struct PgStore {
    conn_str: String,
    cfg: PoolConfig,
    open_slots: Semaphore,
    idle: Mutex<VecDeque<PooledConn>>,
}

impl PgStore {
    /// `conn_str` is a tokio-postgres connection string
    /// (`host=... port=... user=... dbname=...`).
    pub fn new(conn_str: impl Into<String>, cfg: PoolConfig) -> Self {
        Self {
            conn_str: conn_str.into(),
            cfg,
            open_slots: Semaphore::new(cfg.max_open.max(1)),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Create the `model` table, retrying until the store is ready or the
    /// timeout elapses.
    pub async fn ensure_schema(&self, timeout: Duration) -> Result<(), StoreError> {
        let deadline = Instant::now() + timeout;
        let mut last = StoreError::Unavailable("schema bootstrap never attempted".to_string());
        loop {
            match self.try_schema().await {
                Ok(()) => return Ok(()),
                Err(err) => last = err,
            }
            if Instant::now() >= deadline {
                return Err(last);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn try_schema(&self) -> Result<(), StoreError> {
        let (_permit, conn) = self.checkout().await?;
        conn.client.batch_execute(SCHEMA_SQL).await?;
        self.park(conn).await;
        Ok(())
    }

    /// Take a pooled connection, dialing a fresh one when no reusable idle
    /// connection exists. The permit caps open connections at `max_open`.
    async fn checkout(&self) -> Result<(SemaphorePermit<'_>, PooledConn), StoreError> {
        let permit = self
            .open_slots
            .acquire()
            .await
            .map_err(|_| StoreError::Unavailable("connection pool closed".to_string()))?;
        {
            let mut idle = self.idle.lock().await;
            while let Some(conn) = idle.pop_front() {
                if conn.parked_at.elapsed() < self.cfg.idle_timeout && !conn.client.is_closed() {
                    return Ok((permit, conn));
                }
                // Stale or broken; drop it and keep looking.
            }
        }
        let conn = self.dial().await?;
        Ok((permit, conn))
    }

    async fn dial(&self) -> Result<PooledConn, StoreError> {
        let (client, connection) = tokio_postgres::connect(&self.conn_str, NoTls).await?;
        let driver = tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(PooledConn {
            client,
            driver,
            parked_at: Instant::now(),
        })
    }

    /// Return a healthy connection to the idle set, up to `max_idle`.
    async fn park(&self, mut conn: PooledConn) {
        if conn.client.is_closed() {
            return;
        }
        conn.parked_at = Instant::now();
        let mut idle = self.idle.lock().await;
        if idle.len() < self.cfg.max_idle {
            idle.push_back(conn);
        }
    }
}

#[async_trait]
impl StoreHandle for PgStore {
    async fn upsert(&self, key: i64, value: &str) -> Result<(), StoreError> {
        let (_permit, conn) = self.checkout().await?;
        match conn.client.execute(UPSERT_SQL, &[&key, &value]).await {
            Ok(_) => {
                self.park(conn).await;
                Ok(())
            }
            // Failed connections are dropped, not parked.
            Err(err) => Err(err.into()),
        }
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (_permit, conn) = self.checkout().await?;
        let result = conn
            .client
            .query_one(COUNT_SQL, &[])
            .await
            .and_then(|row| row.try_get::<_, i64>(0));
        match result {
            Ok(count) => {
                self.park(conn).await;
                Ok(count)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_below(&self, threshold: i64) -> Result<Option<u64>, StoreError> {
        let (_permit, conn) = self.checkout().await?;
        match conn.client.execute(DELETE_SQL, &[&threshold]).await {
            Ok(rows) => {
                self.park(conn).await;
                Ok(Some(rows))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn leader_info(&self) -> Result<LeaderInfo, StoreError> {
        let (_permit, conn) = self.checkout().await?;
        let result = conn.client.query_one(LEADER_SQL, &[]).await.and_then(|row| {
            let node_id: i64 = row.try_get(0)?;
            let address: String = row.try_get(1)?;
            Ok((node_id, address))
        });
        match result {
            Ok((node_id, address)) => {
                self.park(conn).await;
                Ok(LeaderInfo {
                    node_id: node_id as u64,
                    address,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
