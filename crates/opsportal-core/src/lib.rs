//! Core library for the ops portal session layer.
//!
//! The portal is a thin client over a headless-CMS API. This crate owns the
//! one piece of it with real state: the auth session. It provides:
//!
//! - `CredentialStore`: the current token pair, mirrored to durable storage
//! - `SessionManager`: login, logout, single-flight refresh, background
//!   renewal and the administrator check
//! - `ApiClient`: the reqwest client for the CMS auth endpoints
//! - `Config`: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;

pub use api::{ApiClient, ApiError, AuthBackend};
pub use auth::{
    is_admin, CredentialStore, FileStorage, KeyringStorage, MemoryStorage, SessionManager,
    SessionOptions, TokenPersistence,
};
pub use config::{Config, StorageBackend};
pub use error::AuthError;
pub use models::{
    AuthCheck, AuthTokens, Role, RoleRecord, SessionState, SessionUser, TokenPair, TokenStatus,
};
