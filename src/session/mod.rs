//! Request-scoped session handles.

use std::collections::HashMap;
use std::result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

mod cookie_options;
mod id;
mod registry;

pub use cookie_options::{CookieOptions, DEFAULT_MAX_AGE};
pub use id::{ID_BYTES, ID_LEN, Id, IdError};
pub use registry::Registry;

/// The logical state of a session: arbitrary keys mapped to arbitrary values.
pub type Values = HashMap<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to convert session value: {0}")]
    Value(#[from] serde_json::Error),
}

type Result<T> = result::Result<T, Error>;

/// A session handle.
///
/// Handles are produced by [`Store::new_session`](crate::Store::new_session)
/// or [`Store::get`](crate::Store::get) for a single request and discarded
/// afterwards. Cloning is cheap; clones share the same state.
///
/// Nothing is written to the backend until the handle is passed to
/// [`Store::save`](crate::Store::save).
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    id: RwLock<Option<Id>>,
    values: RwLock<Values>,
    options: RwLock<CookieOptions>,
    // cleared once a cookie-backed record has been loaded
    is_new: AtomicBool,
}

impl Session {
    pub(crate) fn new(name: &str, options: CookieOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                id: RwLock::new(None),
                values: RwLock::new(Values::new()),
                options: RwLock::new(options),
                is_new: AtomicBool::new(true),
            }),
        }
    }

    /// The logical session name, which is also the cookie name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the session ID, if one has been established.
    pub fn id(&self) -> Option<Id> {
        self.inner.id.read().clone()
    }

    /// `true` until a cookie-backed record is successfully loaded.
    pub fn is_new(&self) -> bool {
        self.inner.is_new.load(Ordering::Relaxed)
    }

    /// Deserializes the value stored under `key`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # async fn handler(session: kvsession::Session) -> Result<(), kvsession::session::Error> {
    /// let count: Option<i64> = session.get("count")?;
    /// session.insert("count", &(count.unwrap_or(0) + 1))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.inner.values.read().get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn insert<T>(&self, key: &str, value: &T) -> Result<Option<serde_json::Value>>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        Ok(self.inner.values.write().insert(key.to_string(), value))
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.values.write().remove(key)
    }

    pub fn clear(&self) {
        self.inner.values.write().clear();
    }

    /// A snapshot of every key-value pair in the session.
    pub fn values(&self) -> Values {
        self.inner.values.read().clone()
    }

    /// Returns this handle's cookie options.
    pub fn options(&self) -> CookieOptions {
        self.inner.options.read().clone()
    }

    pub fn set_options(&self, options: CookieOptions) {
        *self.inner.options.write() = options;
    }

    /// Overrides the TTL for this handle only.
    ///
    /// A negative value marks the session for deletion on the next save.
    pub fn set_max_age(&self, seconds: i64) {
        self.inner.options.write().max_age = seconds;
    }

    pub(crate) fn set_id(&self, id: Option<Id>) {
        *self.inner.id.write() = id;
    }

    pub(crate) fn loaded(&self) {
        self.inner.is_new.store(false, Ordering::Relaxed);
    }

    pub(crate) fn read_values(&self) -> RwLockReadGuard<'_, Values> {
        self.inner.values.read()
    }

    pub(crate) fn write_values(&self) -> RwLockWriteGuard<'_, Values> {
        self.inner.values.write()
    }
}
