//! Authentication module for holding the user's session.
//!
//! This module provides:
//! - `SessionStore`: the single owner of the bearer token, with change
//!   notification and write-through persistence
//! - `DeviceStorage`: durable key/value backends (file, OS keychain, memory)
//!
//! Tokens never expire client-side; expiry is only learned from a failed
//! request (see `crate::interceptor`).

pub mod session;
pub mod storage;

pub use session::{AuthState, SessionStore, SessionWatch, TOKEN_KEY};
pub use storage::{
    DeviceStorage, FileStorage, KeyringStorage, MemoryStorage, StorageError, StoredValue,
};
