//! Abstract storage traits for peerlink.
//!
//! The node persists a single counter, its chain height, across restarts.
//! Backends implement [`HeightStore`]; the rest of the workspace depends only
//! on the trait.

pub mod error;
pub mod height;

pub use error::StoreError;
pub use height::HeightStore;
