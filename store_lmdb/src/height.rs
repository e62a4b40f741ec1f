//! LMDB implementation of [`HeightStore`].

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use peerlink_store::{HeightStore, StoreError};

use crate::LmdbError;

const META_DB: &str = "meta";
const HEIGHT_KEY: &[u8] = b"node_height";
const MAP_SIZE: usize = 16 * 1024 * 1024;

pub struct LmdbHeightStore {
    env: Arc<Env>,
    meta_db: Database<Bytes, Bytes>,
}

impl LmdbHeightStore {
    /// Open or create the environment in `dir`.
    pub fn open(dir: &Path) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(dir)?;
        // SAFETY: the directory is owned by this process; no other code maps it.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(1)
                .open(dir)?
        };
        let mut wtxn = env.write_txn()?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;
        tracing::debug!(path = %dir.display(), "opened height store");
        Ok(Self {
            env: Arc::new(env),
            meta_db,
        })
    }

    fn read_height(&self) -> Result<Option<u64>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        match self.meta_db.get(&rtxn, HEIGHT_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    LmdbError::Serialization(format!(
                        "node_height has {} bytes, expected 8",
                        bytes.len()
                    ))
                })?;
                Ok(Some(u64::from_le_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn write_height(&self, height: u64) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        self.meta_db
            .put(&mut wtxn, HEIGHT_KEY, &height.to_le_bytes())?;
        wtxn.commit()?;
        Ok(())
    }
}

impl HeightStore for LmdbHeightStore {
    fn get_height(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.read_height()?)
    }

    fn set_height(&self, height: u64) -> Result<(), StoreError> {
        Ok(self.write_height(height)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_has_no_height() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbHeightStore::open(dir.path()).unwrap();
        assert_eq!(store.get_height().unwrap(), None);
    }

    #[test]
    fn height_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LmdbHeightStore::open(dir.path()).unwrap();
            store.set_height(42).unwrap();
            store.set_height(43).unwrap();
        }
        let store = LmdbHeightStore::open(dir.path()).unwrap();
        assert_eq!(store.get_height().unwrap(), Some(43));
    }

    #[test]
    fn malformed_value_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbHeightStore::open(dir.path()).unwrap();
        let mut wtxn = store.env.write_txn().unwrap();
        store.meta_db.put(&mut wtxn, HEIGHT_KEY, b"abc").unwrap();
        wtxn.commit().unwrap();
        assert!(matches!(store.get_height(), Err(StoreError::Corruption(_))));
    }
}
