//! # kvsession: server-side sessions in a remote key-value table
//!
//! `kvsession` keeps session payloads server-side in a single keyed table
//! (DynamoDB, or anything implementing [`Backend`](backend::Backend)). The
//! browser only holds a signed token naming the session id.
//!
//! Each record carries an absolute expiry. Stale records are never returned:
//! they are deleted lazily when read and swept in bulk by a background task.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kvsession::{CookieOptions, SessionLayer, Store, StoreBuilder};
//! use kvsession::backend::memory::MemoryBackend;
//! use tower_cookies::Cookies;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kvsession::Error> {
//!     let store = StoreBuilder::new(MemoryBackend::new())
//!         .hash_key(b"a secret of at least 32 bytes, ideally".to_vec())
//!         .cookie_options(CookieOptions::build().max_age(3600))
//!         .build()
//!         .await?;
//!
//!     // Wrap your service with `SessionLayer` inside `CookieManagerLayer`.
//!     let _layer = SessionLayer::new(Arc::new(store));
//!     Ok(())
//! }
//!
//! async fn handler(
//!     store: Arc<Store<MemoryBackend>>,
//!     extensions: &http::Extensions,
//!     cookies: &Cookies,
//! ) -> Result<String, Box<dyn std::error::Error>> {
//!     let session = store.get(extensions, "session").await?;
//!     let count = session.get::<i64>("count")?.unwrap_or(0) + 1;
//!     session.insert("count", &count)?;
//!     store.save(cookies, &session).await?;
//!     Ok(format!("You've visited this page {count} times"))
//! }
//! ```
//!
//! # Expiry
//!
//! A handle's `max_age` decides what happens on save:
//!
//! - positive: the record lives that many seconds and the cookie is persistent,
//! - zero: the cookie is a browser-session cookie and the record lives for the
//!   store's [`session_cookie_ttl`](StoreBuilder::session_cookie_ttl),
//! - negative: the record is deleted and the cookie is cleared.
//!
//! # Backends
//!
//! - [`MemoryBackend`](backend::memory::MemoryBackend) for tests and local runs.
//! - `DynamoDbBackend` behind the `dynamodb-store` feature.
//!
//! # Serialization
//!
//! Payloads are MessagePack by default (`messagepack` feature) or JSON.

pub mod backend;
pub mod codec;
pub mod serializer;
pub mod session;
mod service;
pub mod store;
mod sweeper;

pub use session::{CookieOptions, Id, Registry, Session, Values};

pub use store::{Error, LoadError, Store, StoreBuilder};

pub use service::{SessionLayer, SessionService};

pub use sweeper::{SweepReport, Sweeper};

pub use cookie;
pub use tower_cookies;
