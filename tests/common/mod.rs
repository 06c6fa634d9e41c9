#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kvsession::backend::memory::MemoryBackend;
use kvsession::backend::{Backend, Error, Item, ScanPage, TableSpec};
use kvsession::cookie::Cookie;
use kvsession::store::ManualClock;
use kvsession::tower_cookies::Cookies;
use kvsession::{CookieOptions, Store, StoreBuilder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const T0: i64 = 1_700_000_000;
pub const TABLE: &str = "sessions";
pub const HASH_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestPreferences {
    pub theme: String,
    pub language: String,
}

pub fn create_test_user() -> TestUser {
    TestUser {
        id: 1,
        name: "Test User".to_string(),
    }
}

pub fn create_test_preferences() -> TestPreferences {
    TestPreferences {
        theme: "dark".to_string(),
        language: "en".to_string(),
    }
}

pub fn build_cookie_options() -> CookieOptions {
    CookieOptions::build()
        .http_only(true)
        .same_site(kvsession::cookie::SameSite::Lax)
        .secure(true)
        .max_age(3600)
        .path("/")
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(T0))
}

/// A store over `backend` with the sweeper disabled and time under test control.
pub async fn build_store<B: Backend>(backend: B, clock: Arc<ManualClock>) -> Store<B> {
    StoreBuilder::new(backend)
        .hash_key(HASH_KEY)
        .cookie_options(build_cookie_options())
        .clock(clock)
        .background_sweep(false)
        .build()
        .await
        .unwrap()
}

/// Carries the cookie set on a response jar over to the next request's jar.
pub fn next_request(response: &Cookies, name: &str) -> Cookies {
    let cookies = Cookies::default();
    if let Some(cookie) = response.get(name) {
        cookies.add(Cookie::new(name.to_string(), cookie.value().to_string()));
    }
    cookies
}

/// Wraps a [`MemoryBackend`] and fails selected operations on demand.
#[derive(Clone, Debug, Default)]
pub struct FailingBackend {
    pub inner: MemoryBackend,
    fail_get: Arc<AtomicBool>,
    fail_put: Arc<AtomicBool>,
    fail_scan: Arc<AtomicBool>,
    fail_delete_ids: Arc<Mutex<HashSet<String>>>,
}

impl FailingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.fail_delete_ids.lock().insert(id.to_string());
    }
}

fn unavailable() -> Error {
    Error::Backend("service unavailable".to_string())
}

impl Backend for FailingBackend {
    async fn create_table_if_absent(&self, spec: &TableSpec) -> Result<(), Error> {
        self.inner.create_table_if_absent(spec).await
    }

    async fn get_item(&self, table: &str, id: &str) -> Result<Option<Item>, Error> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get_item(table, id).await
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), Error> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.put_item(table, item).await
    }

    async fn delete_item(&self, table: &str, id: &str) -> Result<(), Error> {
        let fail = self.fail_delete_ids.lock().contains(id);
        if fail {
            return Err(unavailable());
        }
        self.inner.delete_item(table, id).await
    }

    async fn scan_page(
        &self,
        table: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage, Error> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.scan_page(table, exclusive_start_key).await
    }
}
