//! Team and environment registry: team lifecycle, join-by-code,
//! environment list management, member administration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand_core::RngCore;

use cove_audit::AuditLog;
use cove_storage::{
    CreateMembershipParams, CreateTeamParams, Membership, MembershipUpdate, Store, StoreError,
    Team, TeamId, TeamRole, TeamUpdate, UserId,
};

use crate::access::{require, Capability};
use crate::error::CoreError;
use crate::identity::Identity;
use crate::scope::{require_membership, require_team_member};

/// Every new team starts with these environments, in this order.
pub const DEFAULT_ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

const MIN_PASSWORD_LEN: usize = 4;

/// Team facts for the caller. The join code is only present when the
/// caller administers the team.
#[derive(Clone, Debug)]
pub struct TeamSummary {
    pub id: TeamId,
    pub name: String,
    pub environments: Vec<String>,
    pub join_code: Option<String>,
    pub member_count: usize,
    pub created_at: DateTime<Utc>,
}

/// The caller's team plus their own membership.
#[derive(Clone, Debug)]
pub struct TeamOverview {
    pub team: TeamSummary,
    pub membership: Membership,
}

/// Admin-side team settings update. Empty updates are rejected.
#[derive(Clone, Debug, Default)]
pub struct TeamSettingsUpdate {
    pub name: Option<String>,
    pub password: Option<String>,
    pub regenerate_code: bool,
}

/// A member row with user details joined in.
#[derive(Clone, Debug)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub role: TeamRole,
    pub can_download: bool,
    pub joined_at: DateTime<Utc>,
}

pub struct TeamRegistry {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditLog>,
}

fn generate_join_code() -> String {
    let mut bytes = [0u8; 4];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes).to_uppercase()
}

/// Lowercase, spaces collapsed to hyphens.
fn normalize_environment_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn valid_environment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl TeamRegistry {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Generate a join code nobody holds yet. Check-then-retry: not
    /// race-free, acceptable because collisions over 4 random bytes are
    /// negligible.
    async fn unique_join_code(&self) -> Result<String, CoreError> {
        loop {
            let code = generate_join_code();
            match self.store.get_team_by_join_code(&code).await {
                Ok(_) => continue,
                Err(StoreError::NotFound) => return Ok(code),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn summarize(team: &Team, is_admin: bool, member_count: usize) -> TeamSummary {
        TeamSummary {
            id: team.id,
            name: team.name.clone(),
            environments: team.environments.clone(),
            join_code: is_admin.then(|| team.join_code.clone()),
            member_count,
            created_at: team.created_at,
        }
    }

    // ───────────────────────────────────── Team lifecycle ─────────────────────────────────

    /// Create a team with the default environments; the creator becomes
    /// its admin.
    pub async fn create_team(
        &self,
        identity: &Identity,
        name: &str,
        password: &str,
    ) -> Result<TeamSummary, CoreError> {
        let name = name.trim();
        if name.is_empty() || password.is_empty() {
            return Err(CoreError::validation("team name and password are required"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CoreError::validation(
                "password must be at least 4 characters",
            ));
        }
        if self.store.membership_of(&identity.user_id).await?.is_some() {
            return Err(CoreError::validation("you are already a member of a team"));
        }

        let join_code = self.unique_join_code().await?;
        let password_hash = cove_crypto::hash_password(password)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let team_id = self
            .store
            .create_team(&CreateTeamParams {
                name: name.to_string(),
                join_code,
                password_hash,
                owner_id: identity.user_id,
                environments: DEFAULT_ENVIRONMENTS.iter().map(|e| e.to_string()).collect(),
            })
            .await?;

        self.store
            .create_membership(&CreateMembershipParams {
                team_id,
                user_id: identity.user_id,
                role: TeamRole::Admin,
                can_download: true,
                title: None,
            })
            .await?;

        let team = self.store.get_team(&team_id).await?;
        Ok(Self::summarize(&team, true, 1))
    }

    /// Join an existing team by join code and team password.
    pub async fn join_team(
        &self,
        identity: &Identity,
        join_code: &str,
        password: &str,
        title: Option<&str>,
    ) -> Result<TeamSummary, CoreError> {
        if join_code.trim().is_empty() || password.is_empty() {
            return Err(CoreError::validation("join code and password are required"));
        }
        if self.store.membership_of(&identity.user_id).await?.is_some() {
            return Err(CoreError::validation("you are already a member of a team"));
        }

        let team = match self
            .store
            .get_team_by_join_code(&join_code.trim().to_uppercase())
            .await
        {
            Ok(team) => team,
            Err(StoreError::NotFound) => return Err(CoreError::validation("invalid join code")),
            Err(e) => return Err(e.into()),
        };

        let valid = cove_crypto::verify_password(password, &team.password_hash)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        if !valid {
            return Err(CoreError::validation("invalid password"));
        }

        self.store
            .create_membership(&CreateMembershipParams {
                team_id: team.id,
                user_id: identity.user_id,
                role: TeamRole::Member,
                can_download: true,
                title: title
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            })
            .await?;

        let member_count = self.store.list_memberships(&team.id).await?.len();
        Ok(Self::summarize(&team, false, member_count))
    }

    /// The caller's team and membership, or `None` when they have no
    /// team (a valid state, not an error).
    pub async fn team_overview(
        &self,
        identity: &Identity,
    ) -> Result<Option<TeamOverview>, CoreError> {
        let Some(membership) = self.store.membership_of(&identity.user_id).await? else {
            return Ok(None);
        };
        let team = match self.store.get_team(&membership.team_id).await {
            Ok(team) => team,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let member_count = self.store.list_memberships(&team.id).await?.len();
        let is_admin = membership.role == TeamRole::Admin;
        Ok(Some(TeamOverview {
            team: Self::summarize(&team, is_admin, member_count),
            membership,
        }))
    }

    /// Rename, change password, regenerate the join code (admin only).
    pub async fn update_settings(
        &self,
        identity: &Identity,
        team_id: &TeamId,
        settings: &TeamSettingsUpdate,
    ) -> Result<TeamSummary, CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;

        let mut update = TeamUpdate::default();

        if let Some(name) = settings.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            update.name = Some(name.to_string());
        }
        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(CoreError::validation(
                    "password must be at least 4 characters",
                ));
            }
            update.password_hash = Some(
                cove_crypto::hash_password(password)
                    .map_err(|e| CoreError::Internal(e.to_string()))?,
            );
        }
        if settings.regenerate_code {
            update.join_code = Some(self.unique_join_code().await?);
        }

        if update.name.is_none() && update.password_hash.is_none() && update.join_code.is_none() {
            return Err(CoreError::validation("no updates provided"));
        }

        self.store.update_team(team_id, &update).await?;
        let team = self.store.get_team(team_id).await?;
        let member_count = self.store.list_memberships(team_id).await?.len();
        Ok(Self::summarize(&team, true, member_count))
    }

    /// Delete a team and everything under it: memberships, projects,
    /// variables, audit entries.
    pub async fn delete_team(&self, identity: &Identity, team_id: &TeamId) -> Result<(), CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;

        self.store.delete_memberships_for_team(team_id).await?;

        let projects = self.store.list_projects(team_id).await?;
        for project in &projects {
            self.store.delete_variables_for_project(&project.id).await?;
            self.audit.delete_for_project(&project.id).await?;
            self.store.delete_project(&project.id).await?;
        }

        self.store.delete_team(team_id).await?;
        Ok(())
    }

    // ───────────────────────────────────── Environments ───────────────────────────────────

    /// Add an environment name (admin only). Returns the new list.
    pub async fn add_environment(
        &self,
        identity: &Identity,
        team_id: &TeamId,
        name: &str,
    ) -> Result<Vec<String>, CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;

        if name.trim().is_empty() {
            return Err(CoreError::validation("environment name is required"));
        }
        let env_name = normalize_environment_name(name);
        if !valid_environment_name(&env_name) {
            return Err(CoreError::validation(
                "environment name must contain only lowercase letters, numbers, and hyphens",
            ));
        }

        let team = self.store.get_team(team_id).await?;
        if team.environments.iter().any(|e| e == &env_name) {
            return Err(CoreError::validation("environment already exists"));
        }

        let mut environments = team.environments;
        environments.push(env_name);
        self.store
            .update_team(
                team_id,
                &TeamUpdate {
                    environments: Some(environments.clone()),
                    ..TeamUpdate::default()
                },
            )
            .await?;
        Ok(environments)
    }

    /// Remove an environment name (admin only). The last environment
    /// cannot be removed. Variables stored under the removed name are
    /// kept: they become unreachable until the name is re-added.
    pub async fn remove_environment(
        &self,
        identity: &Identity,
        team_id: &TeamId,
        name: &str,
    ) -> Result<Vec<String>, CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;

        if name.trim().is_empty() {
            return Err(CoreError::validation("environment name is required"));
        }

        let team = self.store.get_team(team_id).await?;
        if team.environments.len() <= 1 {
            return Err(CoreError::validation("cannot remove the last environment"));
        }
        if !team.environments.iter().any(|e| e == name) {
            return Err(CoreError::NotFound);
        }

        let environments: Vec<String> = team
            .environments
            .into_iter()
            .filter(|e| e != name)
            .collect();
        self.store
            .update_team(
                team_id,
                &TeamUpdate {
                    environments: Some(environments.clone()),
                    ..TeamUpdate::default()
                },
            )
            .await?;
        Ok(environments)
    }

    // ───────────────────────────────────── Members ────────────────────────────────────────

    /// All members of the caller's team, with user details joined in.
    pub async fn list_members(
        &self,
        identity: &Identity,
        team_id: &TeamId,
    ) -> Result<Vec<MemberInfo>, CoreError> {
        require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;

        let memberships = self.store.list_memberships(team_id).await?;
        let ids: Vec<UserId> = memberships.iter().map(|m| m.user_id).collect();
        let users = self.store.list_users_by_ids(&ids).await?;

        Ok(memberships
            .into_iter()
            .map(|m| {
                let user = users.iter().find(|u| u.id == m.user_id);
                MemberInfo {
                    user_id: m.user_id,
                    email: user.map(|u| u.email.clone()),
                    name: user.and_then(|u| u.name.clone()),
                    title: m.title,
                    role: m.role,
                    can_download: m.can_download,
                    joined_at: m.joined_at,
                }
            })
            .collect())
    }

    /// Change another member's role or download permission (admin only,
    /// never your own).
    pub async fn update_member(
        &self,
        identity: &Identity,
        team_id: &TeamId,
        target: &UserId,
        update: &MembershipUpdate,
    ) -> Result<(), CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;
        if target == &identity.user_id {
            return Err(CoreError::validation(
                "cannot modify your own permissions or role",
            ));
        }
        if update.role.is_none() && update.can_download.is_none() {
            return Err(CoreError::validation("no updates provided"));
        }
        self.store.update_membership(team_id, target, update).await?;
        Ok(())
    }

    /// Remove another member from the team (admin only, never yourself).
    pub async fn remove_member(
        &self,
        identity: &Identity,
        team_id: &TeamId,
        target: &UserId,
    ) -> Result<(), CoreError> {
        let membership = require_team_member(self.store.as_ref(), team_id, &identity.user_id).await?;
        require(&membership, Capability::ManageTeam)?;
        if target == &identity.user_id {
            return Err(CoreError::validation("cannot remove yourself from the team"));
        }
        self.store.delete_membership(team_id, target).await?;
        Ok(())
    }

    /// The caller's membership, wherever their team is.
    pub async fn membership_of(&self, identity: &Identity) -> Result<Membership, CoreError> {
        require_membership(self.store.as_ref(), &identity.user_id).await
    }
}
