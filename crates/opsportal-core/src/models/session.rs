use serde::{Deserialize, Serialize};

use super::SessionUser;

/// Where the session stands. Only the session manager moves between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionState {
    /// No stored tokens.
    NoSession,
    /// Tokens present but not verified during this run.
    HasTokens,
    /// A refresh or privilege check is in flight.
    Verifying,
    /// Tokens fresh and administrator access confirmed.
    Valid,
    /// Tokens present but unusable. Treated as `NoSession`.
    Invalid,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NoSession => write!(f, "no session"),
            SessionState::HasTokens => write!(f, "has tokens"),
            SessionState::Verifying => write!(f, "verifying"),
            SessionState::Valid => write!(f, "valid"),
            SessionState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Snapshot of the stored credential, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct TokenStatus {
    pub has_tokens: bool,
    pub is_expired: bool,
    pub time_remaining_secs: u64,
}

impl TokenStatus {
    /// Minutes remaining (for display)
    pub fn minutes_remaining(&self) -> u64 {
        self.time_remaining_secs / 60
    }
}

/// Result of a successful `check_authentication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheck {
    pub user: SessionUser,
    pub is_valid: bool,
}
