use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use dashmap::DashMap;

use super::{AttributeValue, Backend, Error, ID_ATTRIBUTE, Item, ScanPage, TableSpec, read_id};

const DEFAULT_PAGE_SIZE: usize = 100;

/// An in-memory backend.
///
/// Tables are kept in a concurrent map and scanned in `id` order, a page of
/// `page_size` items at a time. Clones share the same tables.
///
/// ### Note
///
/// Do not use this in a production environment.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    tables: Arc<DashMap<String, BTreeMap<String, Item>>>,
    page_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many items a single scan page returns. Clamped to at least 1.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Number of items in `table`, or zero if it does not exist.
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

impl Backend for MemoryBackend {
    async fn create_table_if_absent(&self, spec: &TableSpec) -> Result<(), Error> {
        self.tables.entry(spec.name.clone()).or_default();
        Ok(())
    }

    async fn get_item(&self, table: &str, id: &str) -> Result<Option<Item>, Error> {
        let items = self
            .tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        Ok(items.get(id).cloned())
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), Error> {
        let id = read_id(&item)
            .map_err(|err| Error::Backend(err.to_string()))?
            .to_string();
        let mut items = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        items.insert(id, item);
        Ok(())
    }

    async fn delete_item(&self, table: &str, id: &str) -> Result<(), Error> {
        let mut items = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        items.remove(id);
        Ok(())
    }

    async fn scan_page(
        &self,
        table: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage, Error> {
        let items = self
            .tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        let start = match &exclusive_start_key {
            Some(key) => {
                let id = read_id(key).map_err(|err| Error::Backend(err.to_string()))?;
                Bound::Excluded(id.to_string())
            }
            None => Bound::Unbounded,
        };

        let mut page: Vec<(String, Item)> = items
            .range((start, Bound::Unbounded))
            .take(self.page_size + 1)
            .map(|(id, item)| (id.clone(), item.clone()))
            .collect();

        let last_evaluated_key = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|(id, _)| {
                Item::from([(ID_ATTRIBUTE.to_string(), AttributeValue::S(id.clone()))])
            })
        } else {
            None
        };

        Ok(ScanPage {
            items: page.into_iter().map(|(_, item)| item).collect(),
            last_evaluated_key,
        })
    }
}
