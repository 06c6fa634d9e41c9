//! The storage backend adapter.
//!
//! Session records live in a single remote key-value table keyed by `id`. The
//! store only needs five capabilities from it, captured by [`Backend`]. Item
//! shapes follow DynamoDB's attribute model so a DynamoDB client maps onto the
//! trait directly.
//!
//! Implementations must tolerate concurrent use from many request tasks and
//! the background sweeper at once. Timeouts and retries belong to the adapter;
//! the store never retries on its own.

use std::collections::HashMap;
use std::future::Future;

pub mod memory;
mod record;

#[cfg(feature = "dynamodb-store")]
pub mod dynamodb;

pub use record::{RecordError, SessionRecord};
pub(crate) use record::{read_expires, read_id};

/// Name of the hash key attribute.
pub const ID_ATTRIBUTE: &str = "id";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("{0}")]
    Backend(String),
}

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, kept in its decimal string form.
    N(String),
    /// Binary.
    B(Vec<u8>),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_b(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::B(b) => Some(b),
            _ => None,
        }
    }
}

/// A stored item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// One page of a table scan.
#[derive(Clone, Debug, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Key to resume after; `None` on the last page.
    pub last_evaluated_key: Option<Item>,
}

/// What to create when the session table is missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    /// Name of the string hash key.
    pub key_attribute: String,
    pub read_capacity: i64,
    pub write_capacity: i64,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, read_capacity: i64, write_capacity: i64) -> Self {
        Self {
            name: name.into(),
            key_attribute: ID_ATTRIBUTE.to_string(),
            read_capacity,
            write_capacity,
        }
    }
}

/// The capabilities the store needs from a remote keyed table.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Creates the table described by `spec` unless it already exists.
    fn create_table_if_absent(
        &self,
        spec: &TableSpec,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetches the item whose `id` is `id`.
    fn get_item(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Item>, Error>> + Send;

    /// Writes `item`, replacing any item with the same `id`.
    fn put_item(&self, table: &str, item: Item) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes the item whose `id` is `id`. Deleting a missing item succeeds.
    fn delete_item(&self, table: &str, id: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reads one page of the table, starting after `exclusive_start_key`.
    fn scan_page(
        &self,
        table: &str,
        exclusive_start_key: Option<Item>,
    ) -> impl Future<Output = Result<ScanPage, Error>> + Send;

    /// Walks the whole table page by page.
    ///
    /// `on_page` receives each batch and returns whether to keep going.
    fn scan_all<F, Fut>(
        &self,
        table: &str,
        mut on_page: F,
    ) -> impl Future<Output = Result<(), Error>> + Send
    where
        F: FnMut(Vec<Item>) -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        async move {
            let mut start = None;
            loop {
                let page = self.scan_page(table, start.take()).await?;
                let keep_going = on_page(page.items).await;
                match page.last_evaluated_key {
                    Some(key) if keep_going => start = Some(key),
                    _ => return Ok(()),
                }
            }
        }
    }
}
