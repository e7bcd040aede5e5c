// Session types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Storage key of the email
pub const EMAIL_KEY: &str = "email";
/// Storage key of the display name
pub const NAME_KEY: &str = "name";

/// Credential and identity fields owned by the session manager.
///
/// All fields absent means "no session". The two tokens are always set
/// and cleared together.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Session {
    /// The "no session" value
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when both tokens are present
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// True when every field is absent
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.email.is_none()
            && self.name.is_none()
    }

    /// `Authorization` header value for outgoing requests
    pub fn authorization_header(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }
}

// Tokens are credentials: keep them out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_deref().map(redact))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("email", &self.email)
            .field("name", &self.name)
            .finish()
    }
}

/// Shorten a credential to a loggable prefix
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Claims read from the access token payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Subject, mapped to the session email
    pub sub: Option<String>,
    /// Expiration time, seconds since the Unix epoch
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
}

/// NumericDate may be fractional; keep whole seconds
fn numeric_date<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs: Option<f64> = Option::deserialize(deserializer)?;
    Ok(secs.filter(|s| s.is_finite()).map(|s| s.floor() as i64))
}

/// Refresh request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// New session values minted by the refresh endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("email", &self.email)
            .field("name", &self.name)
            .finish()
    }
}

impl From<RefreshResponse> for TokenGrant {
    fn from(data: RefreshResponse) -> Self {
        Self {
            access_token: data.token,
            refresh_token: data.refresh_token,
            email: data.email,
            name: data.name,
        }
    }
}
