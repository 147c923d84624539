// Table registry: maps table IDs to the page stores that back them

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::common::types::TableId;
use crate::storage::store::PageStore;

/// Catalog of tables known to the buffer pool
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<TableId, Arc<dyn PageStore>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its store's ID, replacing any previous store
    pub fn add_table(&self, store: Arc<dyn PageStore>) -> Option<Arc<dyn PageStore>> {
        self.tables.write().insert(store.table_id(), store)
    }

    pub fn remove_table(&self, table_id: TableId) -> Option<Arc<dyn PageStore>> {
        self.tables.write().remove(&table_id)
    }

    /// Resolve a table ID to its page store
    pub fn page_store(&self, table_id: TableId) -> Option<Arc<dyn PageStore>> {
        self.tables.read().get(&table_id).cloned()
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::heap::HeapFile;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_remove_tables() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new();

        for table_id in [3, 1] {
            let path = dir.path().join(format!("t{}.dat", table_id));
            let heap = HeapFile::create(path, table_id, 128).unwrap();
            assert!(catalog.add_table(Arc::new(heap)).is_none());
        }

        assert_eq!(catalog.table_ids(), vec![1, 3]);
        assert_eq!(catalog.page_store(3).map(|store| store.table_id()), Some(3));

        assert!(catalog.remove_table(3).is_some());
        assert!(catalog.page_store(3).is_none());
        assert_eq!(catalog.table_ids(), vec![1]);
    }
}
