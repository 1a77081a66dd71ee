use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Supplies the bearer token attached to every backend request.
///
/// Token issuance and refresh belong to the identity provider; callers only
/// ever see the current token, or `None` when running anonymously.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>, AuthError>;
}

/// A fixed token, typically taken from configuration.
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>, AuthError> {
        let Some(token) = &self.token else {
            return Ok(None);
        };

        // Opaque (non-JWT) tokens are passed through untouched.
        if let Ok(claims) = Claims::from_token(token) {
            if claims.is_expired(Utc::now()) {
                return Err(AuthError::Expired);
            }
        }

        Ok(Some(token.clone()))
    }
}

/// The handful of ID-token claims the client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Decode the payload segment of a JWT without verifying its signature.
    ///
    /// Verification is the backend's job; this is only used to read the
    /// user's identity for display and request bodies.
    pub fn from_token(token: &str) -> Result<Self, AuthError> {
        let payload = token.split('.').nth(1).ok_or(AuthError::Malformed)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(AuthError::Decode)?;
        serde_json::from_slice(&bytes).map_err(AuthError::Claims)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| exp <= now.timestamp())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token is not a JWT")]
    Malformed,

    #[error("Token payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Token payload is not valid claims JSON: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("Token has expired")]
    Expired,
}
