//! End-to-end harness behavior against the in-memory engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::FlakyStore;
use soak_core::{
    Backoff, HarnessStats, MemStore, OpExecutor, OpKind, OpProfile, RetryError, Runner, RunnerId,
    StoreHandle,
};
use tokio_util::sync::CancellationToken;

fn quick_profile() -> OpProfile {
    OpProfile {
        tick: Duration::from_millis(10),
        budget: Duration::from_secs(5),
        max_attempts: 10,
        backoff: Backoff::with_jitter(Duration::from_millis(1), 0.5),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn writes_then_delete_then_read_reports_zero_rows() -> Result<()> {
    let mem = Arc::new(MemStore::new());
    let executor = OpExecutor::new(mem.clone() as Arc<dyn StoreHandle>);
    let profile = quick_profile();

    let writer = RunnerId::new(OpKind::Write, 0);
    for _ in 0..5 {
        executor.execute(OpKind::Write, &profile, &writer).await?;
    }
    let written = mem.len();
    assert!(written >= 1, "expected at least one distinct key");

    // Let the clock advance past the last write key so the delete
    // threshold strictly exceeds it.
    tokio::time::sleep(Duration::from_millis(2)).await;

    let deleted = executor
        .execute(OpKind::Delete, &profile, &RunnerId::new(OpKind::Delete, 0))
        .await?;
    assert_eq!(deleted.rows_affected, Some(written as u64));

    let read = executor
        .execute(OpKind::Read, &profile, &RunnerId::new(OpKind::Read, 0))
        .await?;
    assert_eq!(read.count, Some(0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn flaky_write_succeeds_after_retries() -> Result<()> {
    let store = Arc::new(FlakyStore::failing(3));
    let executor = OpExecutor::new(store.clone() as Arc<dyn StoreHandle>);

    let outcome = executor
        .execute(
            OpKind::Write,
            &quick_profile(),
            &RunnerId::new(OpKind::Write, 0),
        )
        .await?;

    assert_eq!(outcome.attempts, 4);
    assert_eq!(store.calls(), 4);
    assert_eq!(store.rows(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exhaustion_is_recoverable_and_counted() -> Result<()> {
    let store = Arc::new(FlakyStore::always_failing());
    let stats = Arc::new(HarnessStats::new());
    let executor = OpExecutor::new(store as Arc<dyn StoreHandle>);
    let profile = OpProfile {
        tick: Duration::from_millis(10),
        budget: Duration::from_secs(1),
        max_attempts: 2,
        backoff: Backoff::with_jitter(Duration::from_millis(1), 0.5),
    };

    let shutdown = CancellationToken::new();
    let task = Runner::new(
        RunnerId::new(OpKind::Write, 0),
        OpKind::Write,
        profile,
        executor,
        stats.clone(),
    )
    .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(300)).await;
    // Exhaustion must not kill the runner.
    assert!(!task.is_finished());

    shutdown.cancel();
    task.await?;
    assert!(stats.snapshot().write_failed >= 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_budget_surfaces_deadline_exceeded_after_one_attempt() {
    let store = Arc::new(FlakyStore::always_failing());
    let executor = OpExecutor::new(store as Arc<dyn StoreHandle>);
    let profile = OpProfile {
        tick: Duration::from_millis(10),
        budget: Duration::ZERO,
        max_attempts: 100,
        backoff: Backoff::linear(Duration::from_millis(1)),
    };

    let err = executor
        .execute(OpKind::Read, &profile, &RunnerId::new(OpKind::Read, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RetryError::DeadlineExceeded { attempts: 1, .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_write_and_delete_runners_share_one_handle() -> Result<()> {
    let mem = Arc::new(MemStore::new());
    let stats = Arc::new(HarnessStats::new());
    let executor = OpExecutor::new(mem.clone() as Arc<dyn StoreHandle>);
    let shutdown = CancellationToken::new();

    let write_profile = OpProfile {
        tick: Duration::from_millis(5),
        budget: Duration::from_secs(1),
        max_attempts: 3,
        backoff: Backoff::with_jitter(Duration::from_millis(1), 0.5),
    };
    let delete_profile = OpProfile {
        tick: Duration::from_millis(25),
        ..write_profile
    };

    let writer = Runner::new(
        RunnerId::new(OpKind::Write, 0),
        OpKind::Write,
        write_profile,
        executor.clone(),
        stats.clone(),
    )
    .spawn(shutdown.clone());
    let deleter = Runner::new(
        RunnerId::new(OpKind::Delete, 0),
        OpKind::Delete,
        delete_profile,
        executor.clone(),
        stats.clone(),
    )
    .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    writer.await?;
    deleter.await?;

    let snap = stats.snapshot();
    assert!(snap.write_ok > 0, "writers made no progress: {snap:?}");
    assert_eq!(snap.total_failed(), 0);

    // Quiesced: one final delete below any future key empties the table.
    mem.delete_below(i64::MAX).await?;
    assert_eq!(mem.count().await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_without_affected_row_count_still_succeeds() -> Result<()> {
    let mut flaky = FlakyStore::failing(0);
    flaky.hide_rows_affected = true;
    let store = Arc::new(flaky);
    let executor = OpExecutor::new(store.clone() as Arc<dyn StoreHandle>);
    let profile = quick_profile();

    executor
        .execute(OpKind::Write, &profile, &RunnerId::new(OpKind::Write, 0))
        .await?;
    tokio::time::sleep(Duration::from_millis(2)).await;

    let outcome = executor
        .execute(OpKind::Delete, &profile, &RunnerId::new(OpKind::Delete, 0))
        .await?;
    assert_eq!(outcome.rows_affected, None);
    assert_eq!(store.rows(), 0);
    Ok(())
}
