use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::{Backend, Error, read_expires, read_id};
use crate::store::Clock;

pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts from a single sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items read from the table.
    pub scanned: usize,
    /// Items whose expiry had passed.
    pub expired: usize,
    pub deleted: usize,
    /// Expired items whose delete failed. They are retried on the next sweep.
    pub failed: usize,
    /// Items without a readable `id` or `expires`.
    pub skipped: usize,
}

#[derive(Default)]
struct Counters {
    scanned: AtomicUsize,
    expired: AtomicUsize,
    deleted: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self) -> SweepReport {
        SweepReport {
            scanned: self.scanned.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Removes expired session records from a table.
///
/// Runs once after a warm-up delay and then periodically, or on demand with
/// [`Sweeper::sweep`].
#[derive(Clone, Debug)]
pub struct Sweeper<B: Backend> {
    backend: B,
    table: String,
    clock: Arc<dyn Clock>,
    warm_up: Duration,
    interval: Duration,
}

impl<B> Sweeper<B>
where
    B: Backend,
{
    pub fn new(backend: B, table: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            table: table.into(),
            clock,
            warm_up: DEFAULT_WARM_UP,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Scans the whole table once and deletes every record whose expiry is
    /// at or before now.
    ///
    /// Delete failures are counted and logged without stopping the scan. Only
    /// a failed scan aborts the sweep.
    #[tracing::instrument(name = "sweeping expired sessions", skip(self), fields(table = %self.table))]
    pub async fn sweep(&self) -> Result<SweepReport, Error> {
        let now = self.clock.now().unix_timestamp();
        let counters = Counters::default();

        let backend = &self.backend;
        let table = self.table.as_str();
        let counters_ref = &counters;

        self.backend
            .scan_all(table, move |items| async move {
                for item in items {
                    Counters::bump(&counters_ref.scanned);

                    let (id, expires) = match (read_id(&item), read_expires(&item)) {
                        (Ok(id), Ok(expires)) => (id, expires),
                        (Err(err), _) | (_, Err(err)) => {
                            tracing::debug!(err = %err, "skipping unreadable session record");
                            Counters::bump(&counters_ref.skipped);
                            continue;
                        }
                    };

                    if expires > now {
                        continue;
                    }

                    Counters::bump(&counters_ref.expired);
                    match backend.delete_item(table, id).await {
                        Ok(()) => Counters::bump(&counters_ref.deleted),
                        Err(err) => {
                            tracing::warn!(err = %err, "failed to delete expired session");
                            Counters::bump(&counters_ref.failed);
                        }
                    }
                }
                true
            })
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to scan session table");
                err
            })?;

        let report = counters.report();
        tracing::info!(
            scanned = report.scanned,
            expired = report.expired,
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            "session sweep finished"
        );
        Ok(report)
    }

    async fn sweep_logged(&self) {
        if let Err(err) = self.sweep().await {
            tracing::error!(err = %err, "session sweep failed");
        }
    }

    /// Runs the sweeper in the background for as long as the runtime lives.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.warm_up).await;
            self.sweep_logged().await;

            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_logged().await;
            }
        })
    }
}
