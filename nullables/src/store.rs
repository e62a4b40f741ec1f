//! Nullable height store: in-memory, with a switch to fail every call.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use peerlink_store::{HeightStore, StoreError};

pub struct NullHeightStore {
    height: Mutex<Option<u64>>,
    failing: AtomicBool,
    writes: Mutex<Vec<u64>>,
}

impl NullHeightStore {
    pub fn new() -> Self {
        Self {
            height: Mutex::new(None),
            failing: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// A store that already holds `height`.
    pub fn with_height(height: u64) -> Self {
        let store = Self::new();
        *store.height.lock() = Some(height);
        store
    }

    /// Make every subsequent call return a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every height passed to `set_height`, in order.
    pub fn writes(&self) -> Vec<u64> {
        self.writes.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("null store set to fail".into()));
        }
        Ok(())
    }
}

impl Default for NullHeightStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HeightStore for NullHeightStore {
    fn get_height(&self) -> Result<Option<u64>, StoreError> {
        self.check()?;
        Ok(*self.height.lock())
    }

    fn set_height(&self, height: u64) -> Result<(), StoreError> {
        self.check()?;
        *self.height.lock() = Some(height);
        self.writes.lock().push(height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_writes() {
        let store = NullHeightStore::new();
        store.set_height(3).unwrap();
        store.set_height(4).unwrap();
        assert_eq!(store.get_height().unwrap(), Some(4));
        assert_eq!(store.writes(), vec![3, 4]);
    }

    #[test]
    fn failing_store_errors() {
        let store = NullHeightStore::with_height(9);
        store.set_failing(true);
        assert!(store.get_height().is_err());
        assert!(store.set_height(10).is_err());
    }
}
