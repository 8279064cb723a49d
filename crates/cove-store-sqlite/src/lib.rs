//! SQLite storage backend.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use cove_audit::{
    AuditEntry, AuditEntryId, AuditLog, AuditLogError, AuditQuery, DEFAULT_QUERY_LIMIT,
};
use cove_storage::{
    CreateMembershipParams, CreateProjectParams, CreateTeamParams, CreateUserParams,
    CreateVariableParams, Membership, MembershipUpdate, Project, ProjectId, Store, StoreError,
    Team, TeamId, TeamUpdate, User, UserId, VariableId, VariableRecord, VariableUpdate,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.cove/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".cove");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Insert-path error mapping: UNIQUE violations become `AlreadyExists`.
fn insert_err(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

type VariableRow = (
    String,
    String,
    String,
    String,
    Vec<u8>,
    Option<String>,
    bool,
    bool,
    String,
    DateTime<Utc>,
);

fn variable_from_row(row: VariableRow) -> Result<VariableRecord, StoreError> {
    let (id, project_id, environment, key, value_ciphertext, description, is_commented, is_masked, updated_by, updated_at) =
        row;
    Ok(VariableRecord {
        id: VariableId(parse_uuid(&id)?),
        project_id: ProjectId(parse_uuid(&project_id)?),
        environment,
        key,
        value_ciphertext,
        description,
        is_commented,
        is_masked,
        updated_by: UserId(parse_uuid(&updated_by)?),
        updated_at,
    })
}

const VARIABLE_COLS: &str =
    "id, project_id, environment, key_name, value_ciphertext, description, \
     is_commented, is_masked, updated_by, updated_at";

type MembershipRow = (String, String, String, bool, Option<String>, DateTime<Utc>);

fn membership_from_row(row: MembershipRow) -> Result<Membership, StoreError> {
    let (team_id, user_id, role, can_download, title, joined_at) = row;
    Ok(Membership {
        team_id: TeamId(parse_uuid(&team_id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        role: role.parse().map_err(StoreError::Backend)?,
        can_download,
        title,
        joined_at,
    })
}

type TeamRow = (String, String, String, String, String, String, DateTime<Utc>);

fn team_from_row(row: TeamRow) -> Result<Team, StoreError> {
    let (id, name, join_code, password_hash, owner_id, environments, created_at) = row;
    Ok(Team {
        id: TeamId(parse_uuid(&id)?),
        name,
        join_code,
        password_hash,
        owner_id: UserId(parse_uuid(&owner_id)?),
        environments: serde_json::from_str(&environments)
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at,
    })
}

type UserRow = (String, String, Option<String>, String, DateTime<Utc>);

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, email, name, password_hash, created_at) = row;
    Ok(User {
        id: UserId(parse_uuid(&id)?),
        email,
        name,
        password_hash,
        created_at,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<UserId, StoreError> {
        let id = UserId::new();
        sqlx::query("INSERT INTO users(id,email,name,password_hash,created_at) VALUES(?,?,?,?,?)")
            .bind(id.to_string())
            .bind(&params.email)
            .bind(&params.name)
            .bind(&params.password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(insert_err)?;
        Ok(id)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id,email,name,password_hash,created_at FROM users WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(user_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id,email,name,password_hash,created_at FROM users WHERE id=?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(user_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        // sqlite has no array binds; fetch one by one, ids are few
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_user(id).await {
                Ok(user) => out.push(user),
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // ───────────────────────────────────── Teams ──────────────────────────────────────────

    async fn create_team(&self, params: &CreateTeamParams) -> Result<TeamId, StoreError> {
        let id = TeamId::new();
        let environments = serde_json::to_string(&params.environments)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO teams(id,name,join_code,password_hash,owner_id,environments,created_at)
             VALUES(?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.name)
        .bind(&params.join_code)
        .bind(&params.password_hash)
        .bind(params.owner_id.to_string())
        .bind(environments)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(id)
    }

    async fn get_team(&self, team_id: &TeamId) -> Result<Team, StoreError> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id,name,join_code,password_hash,owner_id,environments,created_at
             FROM teams WHERE id=?",
        )
        .bind(team_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(team_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_team_by_join_code(&self, join_code: &str) -> Result<Team, StoreError> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id,name,join_code,password_hash,owner_id,environments,created_at
             FROM teams WHERE join_code=?",
        )
        .bind(join_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(team_from_row).ok_or(StoreError::NotFound)?
    }

    async fn update_team(&self, team_id: &TeamId, update: &TeamUpdate) -> Result<(), StoreError> {
        let current = self.get_team(team_id).await?;
        let name = update.name.as_ref().unwrap_or(&current.name);
        let password_hash = update
            .password_hash
            .as_ref()
            .unwrap_or(&current.password_hash);
        let join_code = update.join_code.as_ref().unwrap_or(&current.join_code);
        let environments = update
            .environments
            .as_ref()
            .unwrap_or(&current.environments);
        let environments = serde_json::to_string(environments)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            "UPDATE teams SET name=?, password_hash=?, join_code=?, environments=? WHERE id=?",
        )
        .bind(name)
        .bind(password_hash)
        .bind(join_code)
        .bind(environments)
        .bind(team_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_team(&self, team_id: &TeamId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM teams WHERE id=?")
            .bind(team_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    async fn create_membership(&self, params: &CreateMembershipParams) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO memberships(team_id,user_id,role,can_download,title,joined_at)
             VALUES(?,?,?,?,?,?)",
        )
        .bind(params.team_id.to_string())
        .bind(params.user_id.to_string())
        .bind(params.role.to_string())
        .bind(params.can_download)
        .bind(&params.title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    async fn membership_of(&self, user_id: &UserId) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT team_id,user_id,role,can_download,title,joined_at
             FROM memberships WHERE user_id=?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(membership_from_row).transpose()
    }

    async fn get_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT team_id,user_id,role,can_download,title,joined_at
             FROM memberships WHERE team_id=? AND user_id=?",
        )
        .bind(team_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(membership_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_memberships(&self, team_id: &TeamId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT team_id,user_id,role,can_download,title,joined_at
             FROM memberships WHERE team_id=? ORDER BY joined_at",
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(membership_from_row).collect()
    }

    async fn update_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
        update: &MembershipUpdate,
    ) -> Result<(), StoreError> {
        let current = self.get_membership(team_id, user_id).await?;
        let role = update.role.unwrap_or(current.role);
        let can_download = update.can_download.unwrap_or(current.can_download);

        sqlx::query("UPDATE memberships SET role=?, can_download=? WHERE team_id=? AND user_id=?")
            .bind(role.to_string())
            .bind(can_download)
            .bind(team_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM memberships WHERE team_id=? AND user_id=?")
            .bind(team_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_memberships_for_team(&self, team_id: &TeamId) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM memberships WHERE team_id=?")
            .bind(team_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(res.rows_affected())
    }

    // ───────────────────────────────────── Projects ───────────────────────────────────────

    async fn create_project(&self, params: &CreateProjectParams) -> Result<ProjectId, StoreError> {
        let id = ProjectId::new();
        sqlx::query("INSERT INTO projects(id,team_id,name,created_at) VALUES(?,?,?,?)")
            .bind(id.to_string())
            .bind(params.team_id.to_string())
            .bind(&params.name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(insert_err)?;
        Ok(id)
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<Project, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT id,team_id,name,created_at FROM projects WHERE id=?",
        )
        .bind(project_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((id, team_id, name, created_at)) => Ok(Project {
                id: ProjectId(parse_uuid(&id)?),
                team_id: TeamId(parse_uuid(&team_id)?),
                name,
                created_at,
            }),
        }
    }

    async fn list_projects(&self, team_id: &TeamId) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT id,team_id,name,created_at FROM projects WHERE team_id=? ORDER BY id",
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|(id, team_id, name, created_at)| {
                Ok(Project {
                    id: ProjectId(parse_uuid(&id)?),
                    team_id: TeamId(parse_uuid(&team_id)?),
                    name,
                    created_at,
                })
            })
            .collect()
    }

    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM projects WHERE id=?")
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ────────────────────────────────────── Variables ─────────────────────────────────────

    async fn create_variable(
        &self,
        params: &CreateVariableParams,
    ) -> Result<VariableId, StoreError> {
        let id = VariableId::new();
        sqlx::query(
            "INSERT INTO variables(id,project_id,environment,key_name,value_ciphertext,
                                   description,is_commented,is_masked,updated_by,updated_at)
             VALUES(?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(params.project_id.to_string())
        .bind(&params.environment)
        .bind(&params.key)
        .bind(&params.value_ciphertext)
        .bind(&params.description)
        .bind(params.is_commented)
        .bind(params.is_masked)
        .bind(params.updated_by.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(id)
    }

    async fn get_variable(&self, variable_id: &VariableId) -> Result<VariableRecord, StoreError> {
        let row = sqlx::query_as::<_, VariableRow>(&format!(
            "SELECT {} FROM variables WHERE id=?",
            VARIABLE_COLS
        ))
        .bind(variable_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(variable_from_row).ok_or(StoreError::NotFound)?
    }

    async fn find_variable(
        &self,
        project_id: &ProjectId,
        environment: &str,
        key: &str,
    ) -> Result<VariableRecord, StoreError> {
        let row = sqlx::query_as::<_, VariableRow>(&format!(
            "SELECT {} FROM variables WHERE project_id=? AND environment=? AND key_name=?",
            VARIABLE_COLS
        ))
        .bind(project_id.to_string())
        .bind(environment)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(variable_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_variables(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<Vec<VariableRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VariableRow>(&format!(
            "SELECT {} FROM variables WHERE project_id=? AND environment=? ORDER BY id",
            VARIABLE_COLS
        ))
        .bind(project_id.to_string())
        .bind(environment)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(variable_from_row).collect()
    }

    async fn update_variable(
        &self,
        variable_id: &VariableId,
        update: &VariableUpdate,
    ) -> Result<(), StoreError> {
        let current = self.get_variable(variable_id).await?;
        let value_ciphertext = update
            .value_ciphertext
            .as_ref()
            .unwrap_or(&current.value_ciphertext);
        let description = match &update.description {
            Some(d) => d,
            None => &current.description,
        };
        let is_commented = update.is_commented.unwrap_or(current.is_commented);
        let is_masked = update.is_masked.unwrap_or(current.is_masked);

        sqlx::query(
            "UPDATE variables SET value_ciphertext=?, description=?, is_commented=?,
                                  is_masked=?, updated_by=?, updated_at=?
             WHERE id=?",
        )
        .bind(value_ciphertext)
        .bind(description)
        .bind(is_commented)
        .bind(is_masked)
        .bind(update.updated_by.to_string())
        .bind(Utc::now())
        .bind(variable_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_variable(&self, variable_id: &VariableId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM variables WHERE id=?")
            .bind(variable_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_variables_in_environment(
        &self,
        project_id: &ProjectId,
        environment: &str,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM variables WHERE project_id=? AND environment=?")
            .bind(project_id.to_string())
            .bind(environment)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(res.rows_affected())
    }

    async fn delete_variables_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM variables WHERE project_id=?")
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(res.rows_affected())
    }
}

type AuditRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<Vec<u8>>,
    Option<Vec<u8>>,
    DateTime<Utc>,
);

fn audit_from_row(row: AuditRow) -> Result<AuditEntry, AuditLogError> {
    let (id, project_id, environment, variable_key, action, user_id, previous_value, new_value, timestamp) =
        row;
    let parse = |s: &str| Uuid::try_parse(s).map_err(|e| AuditLogError::Database(e.to_string()));
    Ok(AuditEntry {
        id: AuditEntryId(parse(&id)?),
        project_id: ProjectId(parse(&project_id)?),
        environment,
        variable_key,
        action: action.parse().map_err(AuditLogError::Database)?,
        user_id: UserId(parse(&user_id)?),
        previous_value,
        new_value,
        timestamp,
    })
}

#[async_trait::async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditLogError> {
        sqlx::query(
            "INSERT INTO audit_log(id,project_id,environment,variable_key,action,user_id,
                                   previous_value,new_value,timestamp)
             VALUES(?,?,?,?,?,?,?,?,?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.project_id.to_string())
        .bind(&entry.environment)
        .bind(&entry.variable_key)
        .bind(entry.action.to_string())
        .bind(entry.user_id.to_string())
        .bind(&entry.previous_value)
        .bind(&entry.new_value)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditLogError> {
        let limit = query.limit.min(DEFAULT_QUERY_LIMIT) as i64;
        let rows = match &query.environment {
            Some(environment) => {
                sqlx::query_as::<_, AuditRow>(
                    "SELECT id,project_id,environment,variable_key,action,user_id,
                            previous_value,new_value,timestamp
                     FROM audit_log WHERE project_id=? AND environment=?
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(query.project_id.to_string())
                .bind(environment)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, AuditRow>(
                    "SELECT id,project_id,environment,variable_key,action,user_id,
                            previous_value,new_value,timestamp
                     FROM audit_log WHERE project_id=?
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(query.project_id.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AuditLogError::Database(e.to_string()))?;

        rows.into_iter().map(audit_from_row).collect()
    }

    async fn delete_for_project(&self, project_id: &ProjectId) -> Result<u64, AuditLogError> {
        let res = sqlx::query("DELETE FROM audit_log WHERE project_id=?")
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(res.rows_affected())
    }
}
