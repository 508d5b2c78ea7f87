//! Identity Validation
//!
//! Exchanges a caller-supplied bearer credential for a verified user
//! identity. The hub calls this once at join time and again for every
//! inbound message.
//!
//! - **HttpIdentityValidator**: looks the token up on the account backend's
//!   `/profile` endpoint
//! - **StaticIdentityValidator**: fixed token table for local runs and tests

mod client;

pub use client::{HttpIdentityValidator, IdentityConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A verified user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account id; zero means "no such user"
    pub id: i64,
    /// Email, used as the sender identity on broadcasts
    pub email: String,
    /// Account status as reported by the backend
    #[serde(default)]
    pub status: String,
}

impl Identity {
    pub fn new(id: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            status: "active".to_string(),
        }
    }

    /// An identity with a zero id or blank email names nobody
    pub fn is_empty(&self) -> bool {
        self.id == 0 || self.email.trim().is_empty()
    }
}

/// Exchanges credentials for identities
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Validator backed by a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityValidator {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityValidator for StaticIdentityValidator {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::Rejected {
                status: 401,
                message: "unknown token".to_string(),
            })
    }
}

/// Errors that can occur while validating a credential
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization is required")]
    MissingCredential,

    #[error("Identity service unavailable")]
    Unavailable,

    #[error("Identity request timed out")]
    Timeout,

    #[error("Identity request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity service rejected credential ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid identity response: {0}")]
    InvalidResponse(String),

    #[error("Authorization not valid")]
    EmptyIdentity,
}
