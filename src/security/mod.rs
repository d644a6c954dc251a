//! Minimal authentication manager (spec.md §4.12).
//!
//! Supports three credential kinds — password, bearer token, API key —
//! backed by an in-memory store. Passwords are checked against a
//! reference SHA-256 hash.
//!
//! # Security note
//!
//! Unsalted SHA-256 is **not** an adequate password hash for production
//! use: it has no work factor and is trivially brute-forced offline if
//! the hash leaks. This implementation exists to satisfy the protocol
//! surface (credential checks at session start) for local and
//! development deployments. See DESIGN.md for the recommended
//! production replacement (Argon2id).

pub mod credentials;

pub use credentials::{CredentialEntry, CredentialStore};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Authentication failures.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired or unknown")]
    InvalidToken,

    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },
}

/// The `auth` block accepted on `initialize` when `security.require_auth`
/// is set (spec.md §4.12 threads authentication through session start,
/// since the method surface has no dedicated login call).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthParams {
    Password { principal: String, password: String },
    Token { token: String },
    ApiKey { api_key: String },
}

struct IssuedToken {
    principal: String,
    expires_at_unix_secs: u64,
}

/// Issues and validates session tokens against a static credential
/// store.
pub struct SecurityManager {
    credentials: CredentialStore,
    tokens: RwLock<std::collections::HashMap<String, IssuedToken>>,
    token_ttl: Duration,
}

impl SecurityManager {
    #[must_use]
    pub fn new(credentials: CredentialStore, token_ttl: Duration) -> Self {
        Self {
            credentials,
            tokens: RwLock::new(std::collections::HashMap::new()),
            token_ttl,
        }
    }

    /// Authenticates a password login and issues a session token.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidCredentials`] if `principal` is
    /// unknown or `password` does not match its stored hash.
    pub async fn login_with_password(
        &self,
        principal: &str,
        password: &str,
    ) -> Result<SecretString, SecurityError> {
        if !self.credentials.verify_password(principal, password) {
            return Err(SecurityError::InvalidCredentials);
        }
        Ok(self.issue_token(principal).await)
    }

    /// Authenticates a static API key and issues a session token.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidCredentials`] if `api_key` does
    /// not match any configured principal.
    pub async fn login_with_api_key(&self, api_key: &str) -> Result<SecretString, SecurityError> {
        let principal = self.principal_for_api_key(api_key).ok_or(SecurityError::InvalidCredentials)?;
        Ok(self.issue_token(&principal).await)
    }

    /// Resolves an API key to its principal without issuing a token.
    #[must_use]
    pub fn principal_for_api_key(&self, api_key: &str) -> Option<String> {
        self.credentials.principal_for_api_key(api_key)
    }

    /// Validates a bearer token, returning the principal it was issued
    /// to.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidToken`] if the token is unknown or
    /// past its absolute expiry.
    pub async fn authorize_token(&self, token: &str) -> Result<String, SecurityError> {
        let tokens = self.tokens.read().await;
        let issued = tokens.get(token).ok_or(SecurityError::InvalidToken)?;
        if issued.expires_at_unix_secs < now_unix_secs() {
            return Err(SecurityError::InvalidToken);
        }
        Ok(issued.principal.clone())
    }

    /// Checks whether `principal` holds `permission`, honouring the `"*"`
    /// wildcard that grants every permission.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::PermissionDenied`] if the principal lacks
    /// both `permission` and the wildcard.
    pub fn require_permission(&self, principal: &str, permission: &str) -> Result<(), SecurityError> {
        let permissions = self.credentials.permissions_for(principal);
        if permissions.iter().any(|p| p == "*" || p == permission) {
            Ok(())
        } else {
            Err(SecurityError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    async fn issue_token(&self, principal: &str) -> SecretString {
        let token = generate_token();
        let expires_at_unix_secs = now_unix_secs() + self.token_ttl.as_secs();
        self.tokens.write().await.insert(
            token.clone(),
            IssuedToken {
                principal: principal.to_string(),
                expires_at_unix_secs,
            },
        );
        SecretString::from(token)
    }
}

/// Resolves an [`AuthParams`] against `security`, returning the
/// authenticated principal.
///
/// # Errors
///
/// Returns [`SecurityError::InvalidCredentials`] or
/// [`SecurityError::InvalidToken`] depending on which credential kind was
/// presented and why it was rejected.
pub async fn authenticate(security: &SecurityManager, auth: &AuthParams) -> Result<String, SecurityError> {
    match auth {
        AuthParams::Password { principal, password } => {
            security.login_with_password(principal, password).await?;
            Ok(principal.clone())
        }
        AuthParams::Token { token } => security.authorize_token(token).await,
        AuthParams::ApiKey { api_key } => security
            .principal_for_api_key(api_key)
            .ok_or(SecurityError::InvalidCredentials),
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SecurityManager {
        let mut store = CredentialStore::default();
        store.insert(CredentialEntry::with_password(
            "alice",
            "correct horse battery staple",
            vec!["resources:read".to_string()],
        ));
        SecurityManager::new(store, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn correct_password_issues_working_token() {
        let manager = manager();
        let token = manager
            .login_with_password("alice", "correct horse battery staple")
            .await
            .unwrap();
        let principal = manager.authorize_token(token.expose_secret()).await.unwrap();
        assert_eq!(principal, "alice");
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let manager = manager();
        let err = manager
            .login_with_password("alice", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let manager = manager();
        let err = manager.authorize_token("not-a-real-token").await.unwrap_err();
        assert!(matches!(err, SecurityError::InvalidToken));
    }

    #[test]
    fn wildcard_permission_grants_everything() {
        let mut store = CredentialStore::default();
        store.insert(CredentialEntry::with_password("root", "x", vec!["*".to_string()]));
        let manager = SecurityManager::new(store, Duration::from_secs(60));
        assert!(manager.require_permission("root", "tools:call").is_ok());
    }

    #[test]
    fn missing_permission_is_denied() {
        let manager = manager();
        let err = manager
            .require_permission("alice", "tools:call")
            .unwrap_err();
        assert!(matches!(err, SecurityError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn authenticate_resolves_each_auth_kind() {
        let manager = manager();
        let principal = authenticate(
            &manager,
            &AuthParams::Password {
                principal: "alice".to_string(),
                password: "correct horse battery staple".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(principal, "alice");

        let err = authenticate(&manager, &AuthParams::Token { token: "bogus".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidToken));
    }
}
