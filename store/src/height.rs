use crate::StoreError;

/// Durable storage for the local node height.
pub trait HeightStore: Send + Sync {
    /// `Ok(None)` when no height has been written yet.
    fn get_height(&self) -> Result<Option<u64>, StoreError>;

    fn set_height(&self, height: u64) -> Result<(), StoreError>;
}
