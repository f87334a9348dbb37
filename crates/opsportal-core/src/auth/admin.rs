//! The administrator predicate.
//!
//! The CMS role model has no single normalized "is admin" field across
//! versions, so several independent signals are accepted. Any one of them
//! grants access.

use crate::models::{Role, SessionUser};

/// Whether `user` may keep a portal session.
///
/// Checked in order, first match wins:
/// 1. the role record's `admin_access` flag
/// 2. the role name contains "administrator" or "admin" (any case)
/// 3. the role description contains "admin" (any case)
/// 4. the role id equals `sentinel_role_id`
pub fn is_admin(user: &SessionUser, sentinel_role_id: Option<&str>) -> bool {
    let Some(role) = user.role.as_ref() else {
        return false;
    };

    match role {
        Role::Embedded(record) => {
            record.admin_access == Some(true)
                || record.name.as_deref().is_some_and(name_signals_admin)
                || record
                    .description
                    .as_deref()
                    .is_some_and(|d| contains_ignore_case(d, "admin"))
                || matches_sentinel(&record.id, sentinel_role_id)
        }
        Role::Reference(id) => matches_sentinel(id, sentinel_role_id),
    }
}

fn name_signals_admin(name: &str) -> bool {
    contains_ignore_case(name, "administrator") || contains_ignore_case(name, "admin")
}

fn matches_sentinel(id: &str, sentinel_role_id: Option<&str>) -> bool {
    sentinel_role_id.is_some_and(|sentinel| !sentinel.is_empty() && id == sentinel)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
