mod common;

use std::time::Duration;

use query_engine_execution::{CancelHandle, Driver, DriverConnection, ExecutionError, PoolError};
use query_engine_metadata::metadata::DatabaseType;
use similar_asserts::assert_eq;
use tests_common::driver::MemoryDriver;

use common::{approve, executor};

#[tokio::test(start_paused = true)]
async fn exhausted_pool_gives_up_after_the_acquire_timeout() {
    let driver =
        MemoryDriver::new(DatabaseType::Postgresql).with_pool(1, Duration::from_secs(1));
    let _held = driver.acquire().await.unwrap();

    let error = executor(&driver, 1000)
        .execute(
            &approve("SELECT rental_id FROM rental", 1000),
            Duration::from_secs(5),
            &CancelHandle::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(error, ExecutionError::PoolExhausted(Duration::from_secs(1)));
    assert!(driver.executed().is_empty());
}

#[tokio::test]
async fn failed_connects_are_connection_errors() {
    let driver = MemoryDriver::new(DatabaseType::Postgresql).with_failing_connects(2);

    let error = driver.acquire().await.err().unwrap();
    assert!(matches!(error, PoolError::Connect(_)));
    let error = executor(&driver, 10).ping().await.unwrap_err();
    assert!(matches!(error, ExecutionError::Connection(_)));

    // neither failure kept its slot
    assert!(driver.acquire().await.is_ok());
    assert_eq!(driver.connects(), 3);
}

#[tokio::test]
async fn released_connections_are_reused() {
    let driver = MemoryDriver::new(DatabaseType::Postgresql);

    let connection = driver.acquire().await.unwrap();
    let session_key = connection.session_key();
    connection.release();

    assert_eq!(driver.acquire().await.unwrap().session_key(), session_key);
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn dropping_an_acquired_connection_closes_it() {
    let driver = MemoryDriver::new(DatabaseType::Postgresql);

    drop(driver.acquire().await.unwrap());

    let status = driver.pool_status();
    assert_eq!(status.size, 0);
    assert_eq!(status.idle, 0);
    assert_eq!(driver.acquire().await.unwrap().session_key(), Some(101));
}

#[tokio::test]
async fn status_counts_idle_and_active() {
    let driver =
        MemoryDriver::new(DatabaseType::Postgresql).with_pool(3, Duration::from_secs(1));

    let first = driver.acquire().await.unwrap();
    let second = driver.acquire().await.unwrap();
    first.release();

    let status = driver.pool_status();
    assert_eq!(status.size, 2);
    assert_eq!(status.idle, 1);
    assert_eq!(status.active, 1);
    assert_eq!(status.max_connections, 3);
    second.discard();
    assert_eq!(driver.pool_status().size, 1);
}
