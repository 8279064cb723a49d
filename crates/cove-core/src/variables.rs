//! The variable store: CRUD, bulk import, masking, export.
//!
//! Every value is encrypted before it reaches storage and decrypted on
//! the way out. Each mutation of a value appends an audit entry; flag
//! toggles deliberately do not (only value changes are audited).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cove_audit::{AuditEntry, AuditLog};
use cove_crypto::CipherKey;
use cove_storage::{
    CreateVariableParams, Membership, ProjectId, Store, StoreError, VariableId, VariableRecord,
    VariableUpdate,
};

use crate::access::{has_capability, require, Capability};
use crate::dotenv::{self, EnvEntry};
use crate::error::CoreError;
use crate::identity::Identity;
use crate::scope::{project_in_team, require_membership};

/// What a masked value looks like to a member without download
/// permission. A fixed literal: no partial reveal, no length hint.
pub const MASKED_PLACEHOLDER: &str = "MASKED";

/// Input for creating a variable.
#[derive(Clone, Debug)]
pub struct NewVariable {
    pub environment: String,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub is_commented: bool,
    pub is_masked: bool,
}

/// Partial update. `None` leaves a field untouched; an empty `value`
/// string is treated as "no value change"; an empty `description`
/// clears it.
#[derive(Clone, Debug, Default)]
pub struct VariableChange {
    pub value: Option<String>,
    pub description: Option<String>,
    pub is_commented: Option<bool>,
    pub is_masked: Option<bool>,
}

/// A variable as the caller sees it: decrypted, then masked when the
/// caller lacks download permission.
#[derive(Clone, Debug)]
pub struct VariableView {
    pub id: VariableId,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub is_commented: bool,
    pub is_masked: bool,
    /// Mirrors the caller's download capability, masked or not, so the
    /// UI can gate reveal controls uniformly.
    pub can_reveal: bool,
    pub updated_at: DateTime<Utc>,
}

/// One (key, value) pair of a bulk import.
#[derive(Clone, Debug)]
pub struct ImportItem {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

/// Per-pair import outcome, reported back in input order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Created,
    Overridden,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportOutcome {
    pub key: String,
    pub status: ImportStatus,
}

/// Export rendering target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Env,
    Json,
}

pub struct VariableService {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditLog>,
    key: Arc<CipherKey>,
}

impl VariableService {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditLog>, key: Arc<CipherKey>) -> Self {
        Self { store, audit, key }
    }

    /// Record an audit entry; failures are logged, never propagated, so
    /// the already-applied mutation stands.
    async fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(error = %e, "failed to record audit entry");
        }
    }

    async fn scoped_membership(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
    ) -> Result<Membership, CoreError> {
        let membership = require_membership(self.store.as_ref(), &identity.user_id).await?;
        project_in_team(self.store.as_ref(), project_id, &membership.team_id).await?;
        Ok(membership)
    }

    fn view(
        &self,
        record: &VariableRecord,
        membership: &Membership,
    ) -> Result<VariableView, CoreError> {
        let can_reveal = has_capability(membership, Capability::Download);
        let decrypted = cove_crypto::decrypt(&record.value_ciphertext, &self.key)?;
        let value = if record.is_masked && !can_reveal {
            MASKED_PLACEHOLDER.to_string()
        } else {
            decrypted
        };
        Ok(VariableView {
            id: record.id,
            key: record.key.clone(),
            value,
            description: record.description.clone(),
            is_commented: record.is_commented,
            is_masked: record.is_masked,
            can_reveal,
            updated_at: record.updated_at,
        })
    }

    // ───────────────────────────────────── CRUD ───────────────────────────────────────────

    /// Create a variable. The (project, environment, key) triple must be
    /// free; the value is encrypted before it is stored.
    pub async fn create(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        input: &NewVariable,
    ) -> Result<VariableView, CoreError> {
        let membership = self.scoped_membership(identity, project_id).await?;

        if input.environment.is_empty() || input.key.is_empty() {
            return Err(CoreError::validation(
                "environment, key, and value are required",
            ));
        }

        if self
            .store
            .find_variable(project_id, &input.environment, &input.key)
            .await
            .is_ok()
        {
            return Err(duplicate_key_error());
        }

        let ciphertext = cove_crypto::encrypt(&input.value, &self.key)?;
        let variable_id = self
            .store
            .create_variable(&CreateVariableParams {
                project_id: *project_id,
                environment: input.environment.clone(),
                key: input.key.clone(),
                value_ciphertext: ciphertext.clone(),
                description: input
                    .description
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                is_commented: input.is_commented,
                is_masked: input.is_masked,
                updated_by: identity.user_id,
            })
            .await
            .map_err(|e| match e {
                // lost a create race: same outcome as the pre-check
                StoreError::AlreadyExists => duplicate_key_error(),
                e => e.into(),
            })?;

        self.record_audit(AuditEntry::created(
            *project_id,
            &input.environment,
            &input.key,
            identity.user_id,
            ciphertext,
        ))
        .await;

        let record = self.store.get_variable(&variable_id).await?;
        self.view(&record, &membership)
    }

    /// Partial update. Only a value change is audited; unmasking needs
    /// the download capability, masking never does.
    pub async fn update(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        variable_id: &VariableId,
        change: &VariableChange,
    ) -> Result<VariableView, CoreError> {
        let membership = self.scoped_membership(identity, project_id).await?;

        let existing = self.store.get_variable(variable_id).await?;
        if existing.project_id != *project_id {
            return Err(CoreError::NotFound);
        }

        if change.is_masked == Some(false)
            && existing.is_masked
            && !has_capability(&membership, Capability::Download)
        {
            return Err(CoreError::Forbidden(
                "you do not have permission to unmask variables",
            ));
        }

        let new_ciphertext = match change.value.as_deref() {
            Some(value) if !value.is_empty() => Some(cove_crypto::encrypt(value, &self.key)?),
            _ => None,
        };

        let update = VariableUpdate {
            value_ciphertext: new_ciphertext.clone(),
            description: change
                .description
                .as_deref()
                .map(|d| if d.is_empty() { None } else { Some(d.to_string()) }),
            is_commented: change.is_commented,
            is_masked: change.is_masked,
            updated_by: identity.user_id,
        };
        self.store.update_variable(variable_id, &update).await?;

        if let Some(ciphertext) = new_ciphertext {
            self.record_audit(AuditEntry::updated(
                *project_id,
                &existing.environment,
                &existing.key,
                identity.user_id,
                existing.value_ciphertext,
                ciphertext,
            ))
            .await;
        }

        let record = self.store.get_variable(variable_id).await?;
        self.view(&record, &membership)
    }

    /// Delete one variable.
    pub async fn delete(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        variable_id: &VariableId,
    ) -> Result<(), CoreError> {
        self.scoped_membership(identity, project_id).await?;

        let existing = self.store.get_variable(variable_id).await?;
        if existing.project_id != *project_id {
            return Err(CoreError::NotFound);
        }

        self.store.delete_variable(variable_id).await?;

        self.record_audit(AuditEntry::deleted(
            *project_id,
            &existing.environment,
            &existing.key,
            identity.user_id,
            existing.value_ciphertext,
        ))
        .await;
        Ok(())
    }

    /// Delete every variable of an environment (admin only). One audit
    /// entry marks the clear; deleted keys are not enumerated.
    pub async fn clear_environment(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<u64, CoreError> {
        let membership = self.scoped_membership(identity, project_id).await?;
        require(&membership, Capability::ManageTeam)?;

        if environment.is_empty() {
            return Err(CoreError::validation("environment is required"));
        }

        self.record_audit(AuditEntry::environment_cleared(
            *project_id,
            environment,
            identity.user_id,
        ))
        .await;

        Ok(self
            .store
            .delete_variables_in_environment(project_id, environment)
            .await?)
    }

    /// List an environment's variables, decrypted and then masked
    /// according to the caller's download capability.
    pub async fn list(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<Vec<VariableView>, CoreError> {
        let membership = self.scoped_membership(identity, project_id).await?;
        if environment.is_empty() {
            return Err(CoreError::validation("environment parameter is required"));
        }

        let records = self.store.list_variables(project_id, environment).await?;
        records
            .iter()
            .map(|record| self.view(record, &membership))
            .collect()
    }

    // ───────────────────────────────────── Bulk import ────────────────────────────────────

    /// Import ordered (key, value) pairs. Existing keys are overwritten
    /// only when `override_existing` is set, otherwise skipped without a
    /// mutation or audit entry. Import never deletes.
    pub async fn import(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: &str,
        items: &[ImportItem],
        override_existing: bool,
    ) -> Result<Vec<ImportOutcome>, CoreError> {
        self.scoped_membership(identity, project_id).await?;
        if environment.is_empty() {
            return Err(CoreError::validation("environment is required"));
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            if item.key.is_empty() {
                continue;
            }

            let existing = match self
                .store
                .find_variable(project_id, environment, &item.key)
                .await
            {
                Ok(record) => Some(record),
                Err(StoreError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };

            let status = match existing {
                Some(record) => {
                    if !override_existing {
                        ImportStatus::Skipped
                    } else {
                        let ciphertext = cove_crypto::encrypt(&item.value, &self.key)?;
                        self.store
                            .update_variable(
                                &record.id,
                                &VariableUpdate {
                                    value_ciphertext: Some(ciphertext.clone()),
                                    // a new description wins, absent keeps the old one
                                    description: item
                                        .description
                                        .as_ref()
                                        .map(|d| Some(d.clone())),
                                    is_commented: None,
                                    is_masked: None,
                                    updated_by: identity.user_id,
                                },
                            )
                            .await?;
                        self.record_audit(AuditEntry::updated(
                            *project_id,
                            environment,
                            &item.key,
                            identity.user_id,
                            record.value_ciphertext,
                            ciphertext,
                        ))
                        .await;
                        ImportStatus::Overridden
                    }
                }
                None => {
                    let ciphertext = cove_crypto::encrypt(&item.value, &self.key)?;
                    self.store
                        .create_variable(&CreateVariableParams {
                            project_id: *project_id,
                            environment: environment.to_string(),
                            key: item.key.clone(),
                            value_ciphertext: ciphertext.clone(),
                            description: item.description.clone(),
                            is_commented: false,
                            is_masked: false,
                            updated_by: identity.user_id,
                        })
                        .await?;
                    self.record_audit(AuditEntry::created(
                        *project_id,
                        environment,
                        &item.key,
                        identity.user_id,
                        ciphertext,
                    ))
                    .await;
                    ImportStatus::Created
                }
            };

            outcomes.push(ImportOutcome {
                key: item.key.clone(),
                status,
            });
        }
        Ok(outcomes)
    }

    /// Parse pasted `.env` text and import the result.
    pub async fn import_env(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: &str,
        text: &str,
        override_existing: bool,
    ) -> Result<Vec<ImportOutcome>, CoreError> {
        let parsed =
            dotenv::parse_env(text).map_err(|e| CoreError::Validation(e.to_string()))?;
        if parsed.is_empty() {
            return Err(CoreError::validation(
                "no variables found in the provided content",
            ));
        }
        let items: Vec<ImportItem> = parsed
            .into_iter()
            .map(|v| ImportItem {
                key: v.key,
                value: v.value,
                description: None,
            })
            .collect();
        self.import(identity, project_id, environment, &items, override_existing)
            .await
    }

    // ───────────────────────────────────── Export ─────────────────────────────────────────

    /// Export an environment, fully decrypted, as `.env` or JSON text.
    /// Gated by the download capability; masking does not apply here.
    pub async fn export(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: &str,
        format: ExportFormat,
    ) -> Result<String, CoreError> {
        let membership = require_membership(self.store.as_ref(), &identity.user_id).await?;
        if !has_capability(&membership, Capability::Download) {
            return Err(CoreError::Forbidden(
                "you do not have permission to download environment files",
            ));
        }
        project_in_team(self.store.as_ref(), project_id, &membership.team_id).await?;
        if environment.is_empty() {
            return Err(CoreError::validation("environment parameter is required"));
        }

        let records = self.store.list_variables(project_id, environment).await?;
        let entries: Vec<EnvEntry> = records
            .iter()
            .map(|record| {
                Ok(EnvEntry {
                    key: record.key.clone(),
                    value: cove_crypto::decrypt(&record.value_ciphertext, &self.key)?,
                    description: record.description.clone(),
                    is_commented: record.is_commented,
                })
            })
            .collect::<Result<_, CoreError>>()?;

        Ok(match format {
            ExportFormat::Env => dotenv::render_env(&entries),
            ExportFormat::Json => dotenv::render_json(&entries).to_string(),
        })
    }
}

fn duplicate_key_error() -> CoreError {
    CoreError::validation("variable with this key already exists in this environment")
}
