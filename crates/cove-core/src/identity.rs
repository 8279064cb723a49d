//! Credential resolution.
//!
//! Tokens are opaque to the rest of the system: everything downstream
//! works with a resolved [`Identity`]. The shipped resolver signs and
//! verifies HS256 tokens with a 7-day validity window; swap the trait
//! implementation to integrate a different issuer.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use cove_storage::UserId;

use crate::error::CoreError;

/// A resolved caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
}

/// Resolves an opaque bearer token to an identity, or `Unauthorized`.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Identity, CoreError>;
}

const TOKEN_VALIDITY_DAYS: i64 = 7;

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
}

/// HS256 token issuer/verifier.
pub struct TokenKeeper {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeeper {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for a user, valid for 7 days.
    pub fn issue(&self, user_id: &UserId, email: &str) -> Result<String, CoreError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::days(TOKEN_VALIDITY_DAYS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Internal(e.to_string()))
    }
}

impl CredentialResolver for TokenKeeper {
    fn resolve(&self, token: &str) -> Result<Identity, CoreError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| CoreError::Unauthorized)?;
        let user_id = data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| CoreError::Unauthorized)?;
        Ok(Identity {
            user_id,
            email: data.claims.email,
        })
    }
}
