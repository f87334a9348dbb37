//! REST client module for the headless-CMS auth endpoints.
//!
//! `AuthBackend` is the seam the session manager talks through; `ApiClient`
//! implements it over reqwest. The API issues JWT access tokens with a
//! rotating refresh token; the access token travels as a bearer header.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AuthBackend;
pub use client::ApiClient;
pub use error::ApiError;
