pub mod keys;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// String-keyed, string-valued persistent store shared by the trackers.
///
/// Injected into every tracker instead of reaching for a process-global,
/// so tests can substitute [`MemoryStore`] and concurrent writers can
/// coordinate through [`KeyValueStore::compare_and_swap`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Atomically replace the value at `key` with `new` if it currently
    /// equals `expected` (`None` meaning "absent"). Returns whether the
    /// swap happened.
    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: &str) -> Result<bool>;
}
