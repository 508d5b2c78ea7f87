//! Account Backend Client
//!
//! Resolves bearer tokens through the backend's `GET /profile` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{AuthError, Identity, IdentityValidator};

/// Configuration for the account backend client
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the account backend (e.g., "http://localhost:3000/api")
    pub base_url: String,
    /// Value sent in the `x-api-key` header
    pub api_key: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: String::new(),
            request_timeout_ms: 5000,
        }
    }
}

/// Identity validator backed by the account backend
pub struct HttpIdentityValidator {
    client: Client,
    config: IdentityConfig,
}

impl HttpIdentityValidator {
    pub fn new(config: IdentityConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    fn profile_url(&self) -> String {
        format!("{}/profile", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityValidator for HttpIdentityValidator {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let response = self
            .client
            .get(self.profile_url())
            .bearer_auth(credential)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout
                } else if e.is_connect() {
                    AuthError::Unavailable
                } else {
                    AuthError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %message, "Profile lookup rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let identity = Identity {
            id: profile.data.id,
            email: profile.data.email,
            status: profile.data.status,
        };

        if identity.is_empty() {
            return Err(AuthError::EmptyIdentity);
        }

        tracing::debug!(user_id = identity.id, email = %identity.email, "Credential validated");
        Ok(identity)
    }
}

// ============================================
// Response DTOs
// ============================================

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    data: ProfileData,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileData {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    email: String,
    #[serde(default)]
    status: String,
}
