//! Policy data store contract and the in-memory implementation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Immutable view of the data document taken for one request.
///
/// Later writes to the store never become visible through an existing
/// snapshot.
#[derive(Debug, Clone)]
pub struct DataSnapshot {
    root: Arc<Value>,
}

impl DataSnapshot {
    #[must_use]
    pub fn new(root: Arc<Value>) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a nested value; `None` when any segment is missing.
    #[must_use]
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter()
            .try_fold(self.root.as_ref(), |node, seg| node.get(seg.as_ref()))
    }
}

/// Source of consistent read snapshots.
pub trait DataStore: Send + Sync {
    /// Take a snapshot for one evaluation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` when no consistent view can be read.
    fn snapshot(&self) -> Result<DataSnapshot, StoreError>;
}

/// Copy-on-write in-memory store.
///
/// Readers load the current root lock-free; writers are serialized and swap
/// in a modified copy.
pub struct InMemoryDataStore {
    root: ArcSwap<Value>,
    write_lock: Mutex<()>,
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self {
            root: ArcSwap::from_pointee(Value::Object(Map::new())),
            write_lock: Mutex::new(()),
        }
    }
}

impl InMemoryDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `root`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRoot` when `root` is not an object.
    pub fn from_value(root: Value) -> Result<Self, StoreError> {
        if !root.is_object() {
            return Err(StoreError::InvalidRoot);
        }
        Ok(Self {
            root: ArcSwap::from_pointee(root),
            write_lock: Mutex::new(()),
        })
    }

    /// Replace the whole document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRoot` when `root` is not an object.
    pub fn replace(&self, root: Value) -> Result<(), StoreError> {
        if !root.is_object() {
            return Err(StoreError::InvalidRoot);
        }
        let _guard = self.write_lock.lock();
        self.root.store(Arc::new(root));
        Ok(())
    }

    /// Write `value` at `path`, creating intermediate objects.
    ///
    /// # Errors
    ///
    /// - `InvalidRoot` when `path` is empty and `value` is not an object
    /// - `NotAnObject` when an intermediate segment holds a non-object value
    pub fn write<S: AsRef<str>>(&self, path: &[S], value: Value) -> Result<(), StoreError> {
        let Some((last, parents)) = path.split_last() else {
            return self.replace(value);
        };

        let _guard = self.write_lock.lock();
        let mut next = (**self.root.load()).clone();
        let mut node = &mut next;
        for (depth, seg) in parents.iter().enumerate() {
            let Value::Object(obj) = node else {
                return Err(not_an_object(&path[..depth]));
            };
            node = obj
                .entry(seg.as_ref().to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let Value::Object(obj) = node else {
            return Err(not_an_object(parents));
        };
        obj.insert(last.as_ref().to_owned(), value);

        self.root.store(Arc::new(next));
        tracing::debug!(path = %join(path), "Data store updated");
        Ok(())
    }
}

impl DataStore for InMemoryDataStore {
    fn snapshot(&self) -> Result<DataSnapshot, StoreError> {
        Ok(DataSnapshot::new(self.root.load_full()))
    }
}

fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("/")
}

fn not_an_object<S: AsRef<str>>(path: &[S]) -> StoreError {
    StoreError::NotAnObject {
        path: format!("/{}", join(path)),
    }
}
