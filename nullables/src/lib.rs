//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies are abstracted behind traits. This crate provides
//! implementations that never touch the filesystem and can be steered from a
//! test, including into failure.

pub mod identity;
pub mod store;

pub use identity::NullIdentity;
pub use store::NullHeightStore;
