use axum::http::HeaderMap;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// How the caller identity is derived from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum AuthMethod {
    /// User id header set by a trusted in-cluster gateway; cluster calls use the service account
    Internal,
    /// Bearer token from the configured token header
    UserToken,
    /// Access token forwarded by an OAuth proxy sidecar
    OauthProxy,
    /// Fixed identity and in-memory cluster, for local development
    Mock,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMethod::Internal => "internal",
            AuthMethod::UserToken => "user_token",
            AuthMethod::OauthProxy => "oauth_proxy",
            AuthMethod::Mock => "mock",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing required header: {0}")]
    MissingCredential(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("missing request identity")]
    MissingIdentity,

    #[error("invalid request identity: {0}")]
    InvalidIdentity(String),

    #[error("failed to create Kubernetes client: {0}")]
    Client(String),
}

/// Bearer token that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the Kubernetes client only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<redacted, {} bytes>)", self.0.len())
    }
}

/// Identity of the caller for the lifetime of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_id: Option<String>,
    pub token: Option<BearerToken>,
}

impl RequestIdentity {
    pub fn from_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            token: None,
        }
    }

    pub fn from_token(token: BearerToken) -> Self {
        Self {
            user_id: None,
            token: Some(token),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|u| !u.is_empty())
    }

    pub fn token(&self) -> Option<&BearerToken> {
        self.token.as_ref().filter(|t| !t.is_empty())
    }
}

/// Read a header as trimmed UTF-8, treating a blank value as absent
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Extract a bearer token from `header`, stripping `prefix` when configured.
pub fn extract_token(
    headers: &HeaderMap,
    header: &str,
    prefix: &str,
) -> Result<BearerToken, AuthError> {
    let raw = headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AuthError::MissingCredential(header.to_string()))?;

    let token = if prefix.is_empty() {
        raw
    } else {
        match raw.strip_prefix(prefix) {
            Some(rest) => rest,
            // A bare scheme arrives with its trailing space already trimmed
            None if raw.trim_end() == prefix.trim_end() => "",
            None => {
                return Err(AuthError::InvalidCredential(format!(
                    "expected header {} to start with '{}'",
                    header,
                    prefix.trim()
                )))
            }
        }
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential(header.to_string()));
    }

    Ok(BearerToken::new(token))
}
