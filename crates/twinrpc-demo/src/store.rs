//! Record repositories.
//!
//! Handlers never touch a global map: they are handed a [`Repository`] when
//! the routers are built, so every test gets its own isolated store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use thiserror::Error;
use twinrpc_core::ProcedureError;

/// A record with a numeric id.
pub trait Record: Clone + Send + Sync + 'static {
    /// The record's id.
    fn id(&self) -> u64;
}

/// Errors raised by repository lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record has the requested id.
    #[error("{entity} not found")]
    NotFound {
        /// Record kind, e.g. `User`.
        entity: &'static str,
        /// Requested id.
        id: u64,
    },
}

impl From<StoreError> for ProcedureError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ProcedureError::not_found(err.to_string()),
        }
    }
}

/// Keyed storage for one record kind.
///
/// Reads return copies. A read followed by a `put` is not atomic.
pub trait Repository<T: Record>: Send + Sync {
    /// Name used in error messages.
    fn entity(&self) -> &'static str;

    /// Returns the record with `id`.
    fn get(&self, id: u64) -> Option<T>;

    /// Returns every record in id order.
    fn list(&self) -> Vec<T>;

    /// Inserts or replaces a record.
    fn put(&self, record: T);

    /// Returns the record with `id` or a `NotFound` error.
    fn require(&self, id: u64) -> Result<T, StoreError> {
        self.get(id).ok_or(StoreError::NotFound {
            entity: self.entity(),
            id,
        })
    }

    /// The id a new record should take: the current maximum plus one.
    fn next_id(&self) -> u64 {
        self.list().iter().map(Record::id).max().unwrap_or(0) + 1
    }
}

/// A process-local repository behind a read/write lock.
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    entity: &'static str,
    records: RwLock<BTreeMap<u64, T>>,
}

impl<T: Record> InMemoryRepository<T> {
    /// An empty repository.
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// A repository holding `records`.
    pub fn seeded(entity: &'static str, records: impl IntoIterator<Item = T>) -> Self {
        let repo = Self::new(entity);
        for record in records {
            repo.put(record);
        }
        repo
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<T: Record> Repository<T> for InMemoryRepository<T> {
    fn entity(&self) -> &'static str {
        self.entity
    }

    fn get(&self, id: u64) -> Option<T> {
        self.records.read().get(&id).cloned()
    }

    fn list(&self) -> Vec<T> {
        self.records.read().values().cloned().collect()
    }

    fn put(&self, record: T) {
        self.records.write().insert(record.id(), record);
    }

    fn next_id(&self) -> u64 {
        self.records
            .read()
            .keys()
            .next_back()
            .map_or(1, |max| max + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: u64,
        text: &'static str,
    }

    impl Record for Note {
        fn id(&self) -> u64 {
            self.id
        }
    }

    #[test]
    fn test_put_get_list() {
        let repo = InMemoryRepository::new("Note");
        assert!(repo.is_empty());
        repo.put(Note { id: 2, text: "b" });
        repo.put(Note { id: 1, text: "a" });

        assert_eq!(repo.get(1).map(|n| n.text), Some("a"));
        assert_eq!(repo.get(3), None);
        let ids: Vec<u64> = repo.list().iter().map(|n| n.id).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn test_put_replaces() {
        let repo = InMemoryRepository::seeded("Note", [Note { id: 1, text: "a" }]);
        repo.put(Note { id: 1, text: "z" });
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get(1).unwrap().text, "z");
    }

    #[test]
    fn test_next_id_is_max_plus_one() {
        let repo = InMemoryRepository::<Note>::new("Note");
        assert_eq!(repo.next_id(), 1);
        repo.put(Note { id: 7, text: "x" });
        repo.put(Note { id: 3, text: "y" });
        assert_eq!(repo.next_id(), 8);
    }

    #[test]
    fn test_require_reports_entity() {
        let repo = InMemoryRepository::<Note>::new("Note");
        let err = repo.require(9).unwrap_err();
        assert_eq!(err, StoreError::NotFound { entity: "Note", id: 9 });
        assert_eq!(err.to_string(), "Note not found");

        let procedure_err = ProcedureError::from(err);
        assert_eq!(procedure_err.kind(), "NOT_FOUND");
    }
}
