//! In-memory storage backend.
//!
//! This implementation is suitable for:
//! - Tests
//! - Development and single-process embedding
//!
//! Data lives in process memory and is lost on shutdown. For durable
//! deployments use cove-store-sqlite instead.
//!
//! Id-keyed collections use `BTreeMap`, so iteration order is id order —
//! creation order for v7 ids — matching the ordering contract of the
//! `Store` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use cove_audit::{AuditEntry, AuditLog, AuditLogError, AuditQuery, DEFAULT_QUERY_LIMIT};
use cove_storage::{
    CreateMembershipParams, CreateProjectParams, CreateTeamParams, CreateUserParams,
    CreateVariableParams, Membership, MembershipUpdate, Project, ProjectId, Store, StoreError,
    Team, TeamId, TeamUpdate, User, UserId, VariableId, VariableRecord, VariableUpdate,
};

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    teams: BTreeMap<TeamId, Team>,
    memberships: Vec<Membership>,
    projects: BTreeMap<ProjectId, Project>,
    variables: BTreeMap<VariableId, VariableRecord>,
    audit: Vec<AuditEntry>,
}

/// In-memory [`Store`] + [`AuditLog`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<UserId, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == params.email) {
            return Err(StoreError::AlreadyExists);
        }
        let id = UserId::new();
        inner.users.insert(
            id,
            User {
                id,
                email: params.email.clone(),
                name: params.name.clone(),
                password_hash: params.password_hash.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        let inner = self.inner.read().await;
        inner.users.get(user_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect())
    }

    // ───────────────────────────────────── Teams ──────────────────────────────────────────

    async fn create_team(&self, params: &CreateTeamParams) -> Result<TeamId, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.teams.values().any(|t| t.join_code == params.join_code) {
            return Err(StoreError::AlreadyExists);
        }
        let id = TeamId::new();
        inner.teams.insert(
            id,
            Team {
                id,
                name: params.name.clone(),
                join_code: params.join_code.clone(),
                password_hash: params.password_hash.clone(),
                owner_id: params.owner_id,
                environments: params.environments.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_team(&self, team_id: &TeamId) -> Result<Team, StoreError> {
        let inner = self.inner.read().await;
        inner.teams.get(team_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_team_by_join_code(&self, join_code: &str) -> Result<Team, StoreError> {
        let inner = self.inner.read().await;
        inner
            .teams
            .values()
            .find(|t| t.join_code == join_code)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_team(&self, team_id: &TeamId, update: &TeamUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let team = inner.teams.get_mut(team_id).ok_or(StoreError::NotFound)?;
        if let Some(name) = &update.name {
            team.name = name.clone();
        }
        if let Some(hash) = &update.password_hash {
            team.password_hash = hash.clone();
        }
        if let Some(code) = &update.join_code {
            team.join_code = code.clone();
        }
        if let Some(environments) = &update.environments {
            team.environments = environments.clone();
        }
        Ok(())
    }

    async fn delete_team(&self, team_id: &TeamId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .teams
            .remove(team_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    async fn create_membership(&self, params: &CreateMembershipParams) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        // one membership per user
        if inner.memberships.iter().any(|m| m.user_id == params.user_id) {
            return Err(StoreError::AlreadyExists);
        }
        inner.memberships.push(Membership {
            team_id: params.team_id,
            user_id: params.user_id,
            role: params.role,
            can_download: params.can_download,
            title: params.title.clone(),
            joined_at: Utc::now(),
        });
        Ok(())
    }

    async fn membership_of(&self, user_id: &UserId) -> Result<Option<Membership>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .iter()
            .find(|m| m.user_id == *user_id)
            .cloned())
    }

    async fn get_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Membership, StoreError> {
        let inner = self.inner.read().await;
        inner
            .memberships
            .iter()
            .find(|m| m.team_id == *team_id && m.user_id == *user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_memberships(&self, team_id: &TeamId) -> Result<Vec<Membership>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .iter()
            .filter(|m| m.team_id == *team_id)
            .cloned()
            .collect())
    }

    async fn update_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
        update: &MembershipUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let membership = inner
            .memberships
            .iter_mut()
            .find(|m| m.team_id == *team_id && m.user_id == *user_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(role) = update.role {
            membership.role = role;
        }
        if let Some(can_download) = update.can_download {
            membership.can_download = can_download;
        }
        Ok(())
    }

    async fn delete_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.memberships.len();
        inner
            .memberships
            .retain(|m| !(m.team_id == *team_id && m.user_id == *user_id));
        if inner.memberships.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_memberships_for_team(&self, team_id: &TeamId) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.memberships.len();
        inner.memberships.retain(|m| m.team_id != *team_id);
        Ok((before - inner.memberships.len()) as u64)
    }

    // ───────────────────────────────────── Projects ───────────────────────────────────────

    async fn create_project(&self, params: &CreateProjectParams) -> Result<ProjectId, StoreError> {
        let mut inner = self.inner.write().await;
        let id = ProjectId::new();
        inner.projects.insert(
            id,
            Project {
                id,
                team_id: params.team_id,
                name: params.name.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<Project, StoreError> {
        let inner = self.inner.read().await;
        inner
            .projects
            .get(project_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_projects(&self, team_id: &TeamId) -> Result<Vec<Project>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .projects
            .values()
            .filter(|p| p.team_id == *team_id)
            .cloned()
            .collect())
    }

    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .projects
            .remove(project_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ────────────────────────────────────── Variables ─────────────────────────────────────

    async fn create_variable(
        &self,
        params: &CreateVariableParams,
    ) -> Result<VariableId, StoreError> {
        let mut inner = self.inner.write().await;
        let taken = inner.variables.values().any(|v| {
            v.project_id == params.project_id
                && v.environment == params.environment
                && v.key == params.key
        });
        if taken {
            return Err(StoreError::AlreadyExists);
        }
        let id = VariableId::new();
        inner.variables.insert(
            id,
            VariableRecord {
                id,
                project_id: params.project_id,
                environment: params.environment.clone(),
                key: params.key.clone(),
                value_ciphertext: params.value_ciphertext.clone(),
                description: params.description.clone(),
                is_commented: params.is_commented,
                is_masked: params.is_masked,
                updated_by: params.updated_by,
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_variable(&self, variable_id: &VariableId) -> Result<VariableRecord, StoreError> {
        let inner = self.inner.read().await;
        inner
            .variables
            .get(variable_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_variable(
        &self,
        project_id: &ProjectId,
        environment: &str,
        key: &str,
    ) -> Result<VariableRecord, StoreError> {
        let inner = self.inner.read().await;
        inner
            .variables
            .values()
            .find(|v| v.project_id == *project_id && v.environment == environment && v.key == key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_variables(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<Vec<VariableRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .variables
            .values()
            .filter(|v| v.project_id == *project_id && v.environment == environment)
            .cloned()
            .collect())
    }

    async fn update_variable(
        &self,
        variable_id: &VariableId,
        update: &VariableUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let variable = inner
            .variables
            .get_mut(variable_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(ciphertext) = &update.value_ciphertext {
            variable.value_ciphertext = ciphertext.clone();
        }
        if let Some(description) = &update.description {
            variable.description = description.clone();
        }
        if let Some(is_commented) = update.is_commented {
            variable.is_commented = is_commented;
        }
        if let Some(is_masked) = update.is_masked {
            variable.is_masked = is_masked;
        }
        variable.updated_by = update.updated_by;
        variable.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_variable(&self, variable_id: &VariableId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .variables
            .remove(variable_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_variables_in_environment(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.variables.len();
        inner
            .variables
            .retain(|_, v| !(v.project_id == *project_id && v.environment == environment));
        Ok((before - inner.variables.len()) as u64)
    }

    async fn delete_variables_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.variables.len();
        inner.variables.retain(|_, v| v.project_id != *project_id);
        Ok((before - inner.variables.len()) as u64)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditLogError> {
        let mut inner = self.inner.write().await;
        inner.audit.push(entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditLogError> {
        let inner = self.inner.read().await;
        let limit = query.limit.min(DEFAULT_QUERY_LIMIT) as usize;
        // entries are appended in order; walk backwards for newest-first
        Ok(inner
            .audit
            .iter()
            .rev()
            .filter(|e| {
                e.project_id == query.project_id
                    && query
                        .environment
                        .as_ref()
                        .map_or(true, |env| e.environment == *env)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_for_project(&self, project_id: &ProjectId) -> Result<u64, AuditLogError> {
        let mut inner = self.inner.write().await;
        let before = inner.audit.len();
        inner.audit.retain(|e| e.project_id != *project_id);
        Ok((before - inner.audit.len()) as u64)
    }
}
