use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use cookie::time::OffsetDateTime;

/// Source of wall-clock time for expiry computations.
///
/// Production uses [`SystemClock`]; tests use [`ManualClock`] to move time
/// without sleeping.
pub trait Clock: Debug + Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to, at whole-second resolution.
#[derive(Debug)]
pub struct ManualClock {
    unix_secs: AtomicI64,
}

impl ManualClock {
    pub fn new(unix_secs: i64) -> Self {
        Self {
            unix_secs: AtomicI64::new(unix_secs),
        }
    }

    pub fn set(&self, unix_secs: i64) {
        self.unix_secs.store(unix_secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.unix_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.unix_secs.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}
