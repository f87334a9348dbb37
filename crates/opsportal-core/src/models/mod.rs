//! Data models for the session layer.
//!
//! - `TokenPair`, `AuthTokens`: credentials as stored and as issued
//! - `SessionUser`, `Role`, `RoleRecord`: the authenticated principal
//! - `SessionState`, `TokenStatus`, `AuthCheck`: session introspection

pub mod session;
pub mod token;
pub mod user;

pub use session::{AuthCheck, SessionState, TokenStatus};
pub use token::{AuthTokens, TokenPair};
pub use user::{Role, RoleRecord, SessionUser};
