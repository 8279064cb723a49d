use chrono::{DateTime, Utc};

use super::ids::UserId;

/// User record. Credential verification happens elsewhere; the store only
/// holds the hash.
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a user.
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
}
