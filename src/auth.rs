//! Bearer-token authentication.
//!
//! Resolves an incoming token to an `Actor` and applies the inactivity
//! policy: a non-administrator token that has sat idle longer than the
//! configured window is deleted on its next use and the request rejected.
//! Administrator tokens are exempt. Successful authentication refreshes
//! the token's `last_seen` timestamp.
//!
//! This layer is a collaborator of the lifecycle core, never part of it:
//! nothing below `LifecycleService` knows tokens exist.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::policy::Actor;
use crate::lifecycle::state::ActorId;
use crate::repository::RepositoryError;

/// A stored user credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: ActorId,
    pub username: String,
    pub password_digest: String,
    pub is_admin: bool,
}

impl UserRecord {
    pub fn to_actor(&self) -> Actor {
        Actor {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// A stored bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub key: String,
    pub user: ActorId,
    /// Refreshed on every successful authentication; drives the
    /// inactivity expiry check.
    pub last_seen: DateTime<Utc>,
}

/// Storage contract for users and tokens. Implemented by both repository
/// backends alongside `HelpDeskRepository`.
#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// Insert a new user. Returns `None` if the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password_digest: &str,
        is_admin: bool,
    ) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_user_by_name(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError>;

    async fn insert_token(
        &self,
        key: &str,
        user: ActorId,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn token_with_user(
        &self,
        key: &str,
    ) -> Result<Option<(TokenRecord, UserRecord)>, RepositoryError>;

    async fn touch_token(
        &self,
        key: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn delete_token(&self, key: &str) -> Result<bool, RepositoryError>;
}

/// Failures of the authentication layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("token deleted due to inactivity")]
    TokenExpired,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username is already taken")]
    UsernameTaken,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Whether a token has sat idle past the expiry window.
///
/// Pure so the policy is testable without storage. The caller decides
/// whether the owning user is exempt (administrators are).
pub fn is_token_idle_expired(
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    idle_timeout: Duration,
) -> bool {
    now.signed_duration_since(last_seen) > idle_timeout
}

pub struct AuthService {
    repo: Arc<dyn AuthRepository>,
    idle_timeout: Duration,
}

impl AuthService {
    pub fn new(repo: Arc<dyn AuthRepository>, idle_timeout: Duration) -> Self {
        Self { repo, idle_timeout }
    }

    /// Register a new (non-administrator) user.
    pub async fn register(&self, username: &str, password: &str) -> Result<Actor, AuthError> {
        self.create_account(username, password, false).await
    }

    /// Create an account with explicit admin rights. Used for the
    /// bootstrap administrator from configuration, never exposed over HTTP.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<Actor, AuthError> {
        let digest = digest_password(password);
        let user = self
            .repo
            .create_user(username, &digest, is_admin)
            .await?
            .ok_or(AuthError::UsernameTaken)?;
        info!(username = %user.username, is_admin, "registered user");
        Ok(user.to_actor())
    }

    /// Verify credentials and issue a fresh bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .repo
            .find_user_by_name(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &user.password_digest) {
            return Err(AuthError::InvalidCredentials);
        }

        let key = Uuid::new_v4().to_string();
        self.repo.insert_token(&key, user.id, Utc::now()).await?;
        info!(username = %user.username, "issued token");
        Ok(key)
    }

    /// Delete a token. Deleting an unknown token is not an error.
    pub async fn logout(&self, key: &str) -> Result<(), AuthError> {
        self.repo.delete_token(key).await?;
        Ok(())
    }

    /// Resolve a bearer token to an `Actor`, enforcing the inactivity
    /// policy and refreshing `last_seen`.
    pub async fn authenticate(&self, key: &str) -> Result<Actor, AuthError> {
        let (token, user) = self
            .repo
            .token_with_user(key)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        if !user.is_admin && is_token_idle_expired(token.last_seen, now, self.idle_timeout) {
            self.repo.delete_token(key).await?;
            info!(username = %user.username, "deleted idle token");
            return Err(AuthError::TokenExpired);
        }

        self.repo.touch_token(key, now).await?;
        Ok(user.to_actor())
    }
}

/// Salted SHA-256 digest, stored as `salt$hex`.
fn digest_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest_with_salt(&salt, password))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else {
        return false;
    };
    digest_with_salt(salt, password) == digest
}

fn digest_with_salt(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
