mod common;

use std::time::Duration;

use common::*;
use kvsession::backend::memory::MemoryBackend;
use kvsession::backend::{AttributeValue, Backend, Item, SessionRecord, TableSpec};
use kvsession::{StoreBuilder, SweepReport, Sweeper};

fn record(id: &str, expires: i64) -> Item {
    SessionRecord {
        id: id.to_string(),
        data: vec![0x80],
        expires,
    }
    .into_item()
}

/// Ten records over four pages of three; even ids are stale, one of them
/// expiring exactly now. Plus one record without an expiry.
async fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::new().with_page_size(3);
    backend
        .create_table_if_absent(&TableSpec::new(TABLE, 5, 5))
        .await
        .unwrap();

    for i in 0..10 {
        let expires = match i {
            0 => T0,
            i if i % 2 == 0 => T0 - 100,
            _ => T0 + 100,
        };
        backend
            .put_item(TABLE, record(&format!("s{i:02}"), expires))
            .await
            .unwrap();
    }

    let unreadable = Item::from([
        ("id".to_string(), AttributeValue::S("s99".to_string())),
        ("expires".to_string(), AttributeValue::S("soon".to_string())),
    ]);
    backend.put_item(TABLE, unreadable).await.unwrap();
    backend
}

#[tokio::test]
async fn test_sweep_removes_expired_records_across_pages() {
    let backend = seeded_backend().await;
    let sweeper = Sweeper::new(backend.clone(), TABLE, manual_clock());

    let report = sweeper.sweep().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            scanned: 11,
            expired: 5,
            deleted: 5,
            failed: 0,
            skipped: 1,
        }
    );

    assert_eq!(backend.len(TABLE), 6);
    for i in (0..10).step_by(2) {
        let id = format!("s{i:02}");
        assert!(backend.get_item(TABLE, &id).await.unwrap().is_none());
    }
    assert!(backend.get_item(TABLE, "s01").await.unwrap().is_some());

    let again = sweeper.sweep().await.unwrap();
    assert_eq!(again.expired, 0);
    assert_eq!(again.scanned, 6);
}

#[tokio::test]
async fn test_failed_deletes_do_not_stop_the_sweep() {
    let backend = FailingBackend::new(seeded_backend().await);
    backend.fail_delete_of("s02");

    let report = Sweeper::new(backend.clone(), TABLE, manual_clock())
        .sweep()
        .await
        .unwrap();
    assert_eq!(report.expired, 5);
    assert_eq!(report.deleted, 4);
    assert_eq!(report.failed, 1);

    assert!(backend.inner.get_item(TABLE, "s02").await.unwrap().is_some());
    assert!(backend.inner.get_item(TABLE, "s08").await.unwrap().is_none());
}

#[tokio::test]
async fn test_scan_failure_aborts_the_sweep() {
    let backend = FailingBackend::new(seeded_backend().await);
    backend.fail_scan(true);

    let result = Sweeper::new(backend.clone(), TABLE, manual_clock())
        .sweep()
        .await;
    assert!(result.is_err());
    assert_eq!(backend.inner.len(TABLE), 11);
}

#[tokio::test]
async fn test_store_sweeper_uses_the_store_table_and_clock() {
    let backend = seeded_backend().await;
    let clock = manual_clock();
    let store = build_store(backend.clone(), clock.clone()).await;

    clock.advance(100);
    let report = store.sweeper().sweep().await.unwrap();
    assert_eq!(report.deleted, 10);
    assert_eq!(backend.len(TABLE), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweep_runs_after_warm_up_then_daily() {
    let backend = MemoryBackend::new();
    let _store = StoreBuilder::new(backend.clone())
        .hash_key(HASH_KEY)
        .clock(manual_clock())
        .build()
        .await
        .unwrap();

    backend.put_item(TABLE, record("first", T0 - 1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(backend.len(TABLE), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(backend.is_empty(TABLE));

    backend.put_item(TABLE, record("second", T0 - 1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(backend.len(TABLE), 1);

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
    assert!(backend.is_empty(TABLE));
}
