//! Authentication and authorization for the returns engine.
//!
//! Identity provisioning lives in the platform's identity service; this
//! module only resolves a request credential to a caller identity and role.
//! API keys are SHA-256 hashed and looked up in an in-process registry that
//! is seeded from the environment at startup.
//!
//! # Authorization model
//!
//! - `user`: may create, view, and cancel their own returns and read their
//!   own points balance/history.
//! - `operator`: everything a user can do on any return, plus decide,
//!   finalize, and the admin read surface.

mod middleware;

pub use middleware::{auth_middleware, AuthMiddlewareState};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::domain::UserId;

/// Caller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Operator,
}

/// Authentication context extracted from a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthContext {
    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

/// Request extension carrying the auth context.
#[derive(Clone)]
pub struct AuthContextExt(pub AuthContext);

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authentication")]
    MissingAuth,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("insufficient permissions")]
    InsufficientPermissions,
}

/// A registered API key (hash only; plaintext is never stored).
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub key_hash: String,
    pub user_id: UserId,
    pub role: Role,
    pub active: bool,
}

/// In-process API key registry with SHA-256 key hashing.
pub struct ApiKeyValidator {
    keys: RwLock<HashMap<String, ApiKeyRecord>>,
}

impl ApiKeyValidator {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Hash a plaintext key for storage or lookup.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn register_key(&self, record: ApiKeyRecord) {
        self.keys
            .write()
            .expect("api key registry poisoned")
            .insert(record.key_hash.clone(), record);
    }

    pub fn validate(&self, key: &str) -> Result<AuthContext, AuthError> {
        let key_hash = Self::hash_key(key);
        let keys = self.keys.read().expect("api key registry poisoned");
        match keys.get(&key_hash) {
            Some(record) if record.active => Ok(AuthContext {
                user_id: record.user_id,
                role: record.role,
            }),
            _ => Err(AuthError::InvalidApiKey),
        }
    }
}

impl Default for ApiKeyValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the Authorization header to an [`AuthContext`].
pub struct Authenticator {
    api_key_validator: ApiKeyValidator,
}

impl Authenticator {
    pub fn new(api_key_validator: ApiKeyValidator) -> Self {
        Self { api_key_validator }
    }

    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<AuthContext, AuthError> {
        let header = auth_header.ok_or(AuthError::MissingAuth)?;

        if let Some(key) = header.strip_prefix("ApiKey ") {
            return self.api_key_validator.validate(key);
        }

        // Raw keys carry the storefront prefix.
        if header.starts_with("km_") {
            return self.api_key_validator.validate(header);
        }

        Err(AuthError::MissingAuth)
    }
}
