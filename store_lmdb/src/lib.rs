//! LMDB storage backend (via heed).

pub mod error;
pub mod height;

pub use error::LmdbError;
pub use height::LmdbHeightStore;
