//! Authentication module for managing the portal session.
//!
//! This module provides:
//! - `CredentialStore`: the current token pair, mirrored to durable storage
//! - `TokenPersistence` backends: session file, OS keychain, in-memory
//! - `SessionManager`: login, logout, single-flight refresh, background
//!   renewal and the administrator gate
//! - `is_admin`: the administrator predicate

pub mod admin;
pub mod credentials;
mod scheduler;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod mock;

pub use admin::is_admin;
pub use credentials::CredentialStore;
pub use session::{SessionManager, SessionOptions};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, TokenPersistence};
