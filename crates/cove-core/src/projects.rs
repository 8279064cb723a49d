//! Project lifecycle and the project-scoped audit trail.

use std::sync::Arc;

use cove_audit::{AuditEntryView, AuditLog, AuditQuery};
use cove_storage::{CreateProjectParams, Project, ProjectId, Store, UserId};

use crate::access::{has_capability, Capability};
use crate::error::CoreError;
use crate::identity::Identity;
use crate::scope::{project_in_team, require_membership};

pub struct ProjectService {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditLog>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Create a project in the caller's team.
    pub async fn create_project(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<Project, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("project name is required"));
        }
        let membership = match self.store.membership_of(&identity.user_id).await? {
            Some(m) => m,
            None => {
                return Err(CoreError::validation(
                    "you must be part of a team to create projects",
                ))
            }
        };

        let project_id = self
            .store
            .create_project(&CreateProjectParams {
                team_id: membership.team_id,
                name: name.to_string(),
            })
            .await?;
        Ok(self.store.get_project(&project_id).await?)
    }

    /// Projects of the caller's team. No team means no projects.
    pub async fn list_projects(&self, identity: &Identity) -> Result<Vec<Project>, CoreError> {
        match self.store.membership_of(&identity.user_id).await? {
            Some(membership) => Ok(self.store.list_projects(&membership.team_id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// A single project, provided it is in the caller's team scope.
    pub async fn get_project(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
    ) -> Result<Project, CoreError> {
        let membership = require_membership(self.store.as_ref(), &identity.user_id).await?;
        project_in_team(self.store.as_ref(), project_id, &membership.team_id).await
    }

    /// Delete a project and cascade to its variables and audit entries
    /// (admin only).
    pub async fn delete_project(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
    ) -> Result<(), CoreError> {
        let membership = require_membership(self.store.as_ref(), &identity.user_id).await?;
        if !has_capability(&membership, Capability::ManageTeam) {
            return Err(CoreError::Forbidden("only admins can delete projects"));
        }
        project_in_team(self.store.as_ref(), project_id, &membership.team_id).await?;

        self.store.delete_project(project_id).await?;
        self.store.delete_variables_for_project(project_id).await?;
        self.audit.delete_for_project(project_id).await?;
        Ok(())
    }

    /// The project's audit trail: newest first, at most 100 entries,
    /// acting users' emails joined in, value snapshots redacted.
    pub async fn audit_trail(
        &self,
        identity: &Identity,
        project_id: &ProjectId,
        environment: Option<&str>,
    ) -> Result<Vec<AuditEntryView>, CoreError> {
        let membership = require_membership(self.store.as_ref(), &identity.user_id).await?;
        project_in_team(self.store.as_ref(), project_id, &membership.team_id).await?;

        let mut query = AuditQuery::for_project(*project_id);
        if let Some(environment) = environment {
            query = query.environment(environment);
        }
        let entries = self.audit.query(&query).await?;

        let mut user_ids: Vec<UserId> = entries.iter().map(|e| e.user_id).collect();
        user_ids.sort();
        user_ids.dedup();
        let users = self.store.list_users_by_ids(&user_ids).await?;

        Ok(entries
            .iter()
            .map(|entry| {
                let email = users
                    .iter()
                    .find(|u| u.id == entry.user_id)
                    .map(|u| u.email.clone());
                AuditEntryView::from_entry(entry, email)
            })
            .collect())
    }
}
