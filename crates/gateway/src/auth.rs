use crate::error::ApiError;
use axum::http::{HeaderMap, header};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks viewer and settings tokens.
pub enum TokenVerifier {
    /// Every request is accepted.
    Open,
    Static(HashSet<String>),
    /// POSTs `{"token": ...}` to an auth service; any 2xx means valid.
    Remote { client: reqwest::Client, url: String },
}

impl TokenVerifier {
    pub fn from_config(tokens: &[String], verify_url: Option<&str>) -> anyhow::Result<Self> {
        if let Some(url) = verify_url {
            let client = reqwest::Client::builder().timeout(VERIFY_TIMEOUT).build()?;
            tracing::info!(url, "Remote token verification enabled");
            return Ok(Self::Remote {
                client,
                url: url.to_string(),
            });
        }
        if tokens.is_empty() {
            tracing::warn!("No AUTH_TOKENS or AUTH_VERIFY_URL configured, token checks disabled");
            return Ok(Self::Open);
        }
        Ok(Self::Static(tokens.iter().cloned().collect()))
    }

    pub async fn verify(&self, token: Option<&str>) -> Result<(), ApiError> {
        if matches!(self, TokenVerifier::Open) {
            return Ok(());
        }
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing token".into()))?;

        match self {
            TokenVerifier::Open => Ok(()),
            TokenVerifier::Static(tokens) => {
                if tokens.contains(token) {
                    Ok(())
                } else {
                    Err(ApiError::Unauthorized("Invalid token".into()))
                }
            }
            TokenVerifier::Remote { client, url } => {
                let response = client
                    .post(url)
                    .json(&json!({ "token": token }))
                    .send()
                    .await
                    .map_err(|e| ApiError::Upstream(format!("Auth service unreachable: {e}")))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    tracing::debug!(status = %response.status(), "Token rejected by auth service");
                    Err(ApiError::Unauthorized("Invalid token".into()))
                }
            }
        }
    }
}

/// Token from the `token` query parameter, else from `Authorization: Bearer`.
pub fn request_token<'a>(query: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    query.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    })
}
