use chrono::{DateTime, Utc};

use super::ids::{ProjectId, UserId, VariableId};

/// Encrypted variable row; no plaintext in storage.
///
/// `is_commented` and `is_masked` are independent display/export flags:
/// neither affects how the value is stored.
#[derive(Clone, Debug)]
pub struct VariableRecord {
    pub id: VariableId,
    pub project_id: ProjectId,
    /// Environment name. Not validated against the team's current list so
    /// rows survive environment removal (orphaning policy).
    pub environment: String,
    pub key: String,
    /// Nonce-prefixed AEAD blob from `cove-crypto`.
    pub value_ciphertext: Vec<u8>,
    pub description: Option<String>,
    pub is_commented: bool,
    pub is_masked: bool,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a variable.
#[derive(Clone, Debug)]
pub struct CreateVariableParams {
    pub project_id: ProjectId,
    pub environment: String,
    pub key: String,
    pub value_ciphertext: Vec<u8>,
    pub description: Option<String>,
    pub is_commented: bool,
    pub is_masked: bool,
    pub updated_by: UserId,
}

/// Partial variable update; `None` fields are left untouched.
///
/// `description` is doubly optional: `Some(None)` clears it, `None` keeps
/// it. Backends stamp `updated_at` themselves.
#[derive(Clone, Debug)]
pub struct VariableUpdate {
    pub value_ciphertext: Option<Vec<u8>>,
    pub description: Option<Option<String>>,
    pub is_commented: Option<bool>,
    pub is_masked: Option<bool>,
    pub updated_by: UserId,
}
