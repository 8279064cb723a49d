//! Service layer of cove: identity resolution, team/environment
//! registry, projects, the variable store, and `.env` import/export.
//!
//! Data flow: a request resolves a credential to an [`Identity`], the
//! identity to a membership and team scope, then the operation runs
//! against the [`Store`](cove_storage::Store), encrypting and decrypting
//! through `cove-crypto` and appending to the
//! [`AuditLog`](cove_audit::AuditLog) on every value mutation.

pub mod access;
pub mod dotenv;
pub mod error;
pub mod identity;
pub mod projects;
pub mod registry;
mod scope;
pub mod variables;

pub use access::{has_capability, require, Capability};
pub use error::CoreError;
pub use identity::{CredentialResolver, Identity, TokenKeeper};
pub use projects::ProjectService;
pub use registry::{
    MemberInfo, TeamOverview, TeamRegistry, TeamSettingsUpdate, TeamSummary, DEFAULT_ENVIRONMENTS,
};
pub use variables::{
    ExportFormat, ImportItem, ImportOutcome, ImportStatus, NewVariable, VariableChange,
    VariableService, VariableView, MASKED_PLACEHOLDER,
};
