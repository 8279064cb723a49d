//! Capability checks.
//!
//! One function answers every "may this member do that" question so the
//! role/permission rules live in a single place instead of inline
//! conditionals scattered across operations.

use cove_storage::{Membership, TeamRole};

use crate::error::CoreError;

/// What an operation requires of the acting membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Team administration: environments, settings, member management,
    /// project deletion, environment clears.
    ManageTeam,
    /// Export `.env`/JSON and reveal or unmask masked values.
    Download,
}

/// Admins hold every capability; the stored `can_download` flag only
/// gates non-admins.
pub fn has_capability(membership: &Membership, capability: Capability) -> bool {
    match capability {
        Capability::ManageTeam => membership.role == TeamRole::Admin,
        Capability::Download => membership.role == TeamRole::Admin || membership.can_download,
    }
}

pub fn require(membership: &Membership, capability: Capability) -> Result<(), CoreError> {
    if has_capability(membership, capability) {
        return Ok(());
    }
    Err(match capability {
        Capability::ManageTeam => CoreError::Forbidden("admin access required"),
        Capability::Download => CoreError::Forbidden("download permission required"),
    })
}
