//! Audit logging abstraction for cove.
//!
//! This crate defines the `AuditLog` trait for persisting audit entries
//! and the types representing auditable variable mutations. The log is
//! append-only: nothing updates or deletes entries except the project and
//! team teardown cascades.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use cove_storage::{ProjectId, UserId};

/// Sentinel variable key recorded when an admin clears a whole
/// environment; individual deleted keys are intentionally not enumerated.
pub const CLEAR_ALL_KEY: &str = "ALL_VARIABLES";

/// Query results are bounded to the most recent entries.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Unique identifier for an audit entry (UUID v7, time-ordered).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Auditable variable mutations. These are the only state transitions a
/// variable has.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for VariableAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VariableAction::Create => "create",
            VariableAction::Update => "update",
            VariableAction::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for VariableAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(VariableAction::Create),
            "update" => Ok(VariableAction::Update),
            "delete" => Ok(VariableAction::Delete),
            _ => Err(format!("unknown audit action: {}", s)),
        }
    }
}

/// One appended audit record.
///
/// Value snapshots hold the stored ciphertext, never plaintext. The query
/// surface redacts them entirely (see [`AuditEntryView`]); they exist for
/// forensic access against the store itself.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub project_id: ProjectId,
    pub environment: String,
    pub variable_key: String,
    pub action: VariableAction,
    pub user_id: UserId,
    pub previous_value: Option<Vec<u8>>,
    pub new_value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    fn base(
        project_id: ProjectId,
        environment: &str,
        variable_key: &str,
        action: VariableAction,
        user_id: UserId,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            project_id,
            environment: environment.to_string(),
            variable_key: variable_key.to_string(),
            action,
            user_id,
            previous_value: None,
            new_value: None,
            timestamp: Utc::now(),
        }
    }

    /// A `create` entry: only the new ciphertext is recorded.
    pub fn created(
        project_id: ProjectId,
        environment: &str,
        variable_key: &str,
        user_id: UserId,
        new_value: Vec<u8>,
    ) -> Self {
        let mut e = Self::base(
            project_id,
            environment,
            variable_key,
            VariableAction::Create,
            user_id,
        );
        e.new_value = Some(new_value);
        e
    }

    /// An `update` entry: previous and new ciphertext are both recorded.
    pub fn updated(
        project_id: ProjectId,
        environment: &str,
        variable_key: &str,
        user_id: UserId,
        previous_value: Vec<u8>,
        new_value: Vec<u8>,
    ) -> Self {
        let mut e = Self::base(
            project_id,
            environment,
            variable_key,
            VariableAction::Update,
            user_id,
        );
        e.previous_value = Some(previous_value);
        e.new_value = Some(new_value);
        e
    }

    /// A `delete` entry: only the previous ciphertext is recorded.
    pub fn deleted(
        project_id: ProjectId,
        environment: &str,
        variable_key: &str,
        user_id: UserId,
        previous_value: Vec<u8>,
    ) -> Self {
        let mut e = Self::base(
            project_id,
            environment,
            variable_key,
            VariableAction::Delete,
            user_id,
        );
        e.previous_value = Some(previous_value);
        e
    }

    /// A whole-environment clear: one `delete` entry under
    /// [`CLEAR_ALL_KEY`], no value snapshots.
    pub fn environment_cleared(
        project_id: ProjectId,
        environment: &str,
        user_id: UserId,
    ) -> Self {
        Self::base(
            project_id,
            environment,
            CLEAR_ALL_KEY,
            VariableAction::Delete,
            user_id,
        )
    }
}

/// Filter for querying audit entries.
#[derive(Clone, Debug)]
pub struct AuditQuery {
    pub project_id: ProjectId,
    /// Restrict to one environment when set.
    pub environment: Option<String>,
    /// Maximum number of entries, newest first. Backends cap this at
    /// [`DEFAULT_QUERY_LIMIT`].
    pub limit: u32,
}

impl AuditQuery {
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id,
            environment: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// The redacted, display-facing shape of an entry: who changed what and
/// when, with the acting user's email joined in — never the value
/// snapshots, even encrypted.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEntryView {
    pub id: AuditEntryId,
    pub project_id: ProjectId,
    pub environment: String,
    pub variable_key: String,
    pub action: VariableAction,
    pub user_id: UserId,
    pub user_email: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntryView {
    pub fn from_entry(entry: &AuditEntry, user_email: Option<String>) -> Self {
        Self {
            id: entry.id,
            project_id: entry.project_id,
            environment: entry.environment.clone(),
            variable_key: entry.variable_key.clone(),
            action: entry.action,
            user_id: entry.user_id,
            user_email,
            timestamp: entry.timestamp,
        }
    }
}

/// Error type for audit log operations.
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("database error: {0}")]
    Database(String),
}

/// Trait for audit log persistence.
///
/// Implementations store entries append-only. Failures to record should
/// be logged by the caller but must not fail the mutation that triggered
/// them.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditLogError>;

    /// Entries matching the filter, newest first, capped at
    /// [`DEFAULT_QUERY_LIMIT`].
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditLogError>;

    /// Remove every entry of a project (teardown cascade only).
    /// Returns the number of entries removed.
    async fn delete_for_project(&self, project_id: &ProjectId) -> Result<u64, AuditLogError>;
}
