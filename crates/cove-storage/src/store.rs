//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the service layer depends on.
///
/// Backends map their native uniqueness violations to
/// [`StoreError::AlreadyExists`] and absent rows to
/// [`StoreError::NotFound`]; everything else is `Backend`.
///
/// Listing methods return rows in id order, which for v7 ids is creation
/// order.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create a new user (returns generated id). Email is unique.
    async fn create_user(&self, params: &CreateUserParams) -> Result<UserId, StoreError>;

    /// Get user by email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Get user by id.
    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Fetch a batch of users by id (missing ids are silently dropped).
    async fn list_users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    // ───────────────────────────────────── Teams ──────────────────────────────────────────

    /// Create a new team (returns generated id). Join code is unique.
    async fn create_team(&self, params: &CreateTeamParams) -> Result<TeamId, StoreError>;

    /// Get team by id.
    async fn get_team(&self, team_id: &TeamId) -> Result<Team, StoreError>;

    /// Get team by join code (exact match, codes are stored uppercase).
    async fn get_team_by_join_code(&self, join_code: &str) -> Result<Team, StoreError>;

    /// Apply a partial update to a team.
    async fn update_team(&self, team_id: &TeamId, update: &TeamUpdate) -> Result<(), StoreError>;

    /// Delete a team record. Cascades are orchestrated by the caller.
    async fn delete_team(&self, team_id: &TeamId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    /// Create a membership. Fails `AlreadyExists` if the user already
    /// belongs to a team (one membership per user).
    async fn create_membership(&self, params: &CreateMembershipParams) -> Result<(), StoreError>;

    /// The caller's membership, if any. `None` is the valid "no team"
    /// state, not an error.
    async fn membership_of(&self, user_id: &UserId) -> Result<Option<Membership>, StoreError>;

    /// Get a specific membership within a team.
    async fn get_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Membership, StoreError>;

    /// List all memberships of a team.
    async fn list_memberships(&self, team_id: &TeamId) -> Result<Vec<Membership>, StoreError>;

    /// Apply a partial update to a membership.
    async fn update_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
        update: &MembershipUpdate,
    ) -> Result<(), StoreError>;

    /// Remove a single membership.
    async fn delete_membership(&self, team_id: &TeamId, user_id: &UserId)
        -> Result<(), StoreError>;

    /// Remove all memberships of a team (team teardown).
    /// Returns the number of memberships removed.
    async fn delete_memberships_for_team(&self, team_id: &TeamId) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Projects ───────────────────────────────────────

    /// Create a project within a team (returns generated id).
    async fn create_project(&self, params: &CreateProjectParams) -> Result<ProjectId, StoreError>;

    /// Get a project by id.
    async fn get_project(&self, project_id: &ProjectId) -> Result<Project, StoreError>;

    /// List all projects of a team.
    async fn list_projects(&self, team_id: &TeamId) -> Result<Vec<Project>, StoreError>;

    /// Delete a project record. Cascades are orchestrated by the caller.
    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), StoreError>;

    // ────────────────────────────────────── Variables ─────────────────────────────────────

    /// Insert a variable. Fails `AlreadyExists` when the
    /// (project, environment, key) triple is taken.
    async fn create_variable(
        &self,
        params: &CreateVariableParams,
    ) -> Result<VariableId, StoreError>;

    /// Get a variable by id.
    async fn get_variable(&self, variable_id: &VariableId) -> Result<VariableRecord, StoreError>;

    /// Find a variable by its (project, environment, key) triple.
    async fn find_variable(
        &self,
        project_id: &ProjectId,
        environment: &str,
        key: &str,
    ) -> Result<VariableRecord, StoreError>;

    /// List all variables of a project environment.
    async fn list_variables(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<Vec<VariableRecord>, StoreError>;

    /// Apply a partial update to a variable and stamp `updated_at`.
    async fn update_variable(
        &self,
        variable_id: &VariableId,
        update: &VariableUpdate,
    ) -> Result<(), StoreError>;

    /// Delete a single variable.
    async fn delete_variable(&self, variable_id: &VariableId) -> Result<(), StoreError>;

    /// Delete every variable of a project environment.
    /// Returns the number of variables removed.
    async fn delete_variables_in_environment(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<u64, StoreError>;

    /// Delete every variable of a project (project teardown).
    /// Returns the number of variables removed.
    async fn delete_variables_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<u64, StoreError>;
}
