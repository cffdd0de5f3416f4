//! Domain model types for sessionward.
//!
//! This module defines the data that flows through the session lifecycle:
//! - [`CredentialPair`] - The access/refresh token pair of one session
//! - [`UserProfile`] - The user snapshot returned alongside a pair
//! - [`SessionGrant`] - What the remote authority returns on login or renewal
//! - [`ApiEnvelope`] - The `{success, message, data}` wrapper around every response

use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// The credentials of one session.
///
/// Always replaced wholesale; the access token and refresh token of a pair
/// were issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Short-lived signed token attached to outbound requests.
    pub access_token: Secret,

    /// Opaque token used only to obtain a new pair.
    pub refresh_token: Secret,
}

impl CredentialPair {
    /// Create a new credential pair.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: Secret::new(refresh_token),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        bearer(&self.access_token)
    }
}

/// Format a bearer authorization value.
pub(crate) fn bearer(token: &Secret) -> String {
    format!("Bearer {}", token.expose())
}

/// User profile stored next to the credential pair.
///
/// Kept for display only; authorization never looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<String>,
}

impl UserProfile {
    /// Name to show for this user, preferring the nickname.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }
}

/// Credentials issued by the remote authority on login or renewal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub access_token: Secret,
    pub refresh_token: Secret,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds, as reported by the server.
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: UserProfile,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl SessionGrant {
    /// Split the grant into the pair and the snapshot that get stored.
    pub fn into_parts(self) -> (CredentialPair, UserProfile) {
        (
            CredentialPair {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
            },
            self.user,
        )
    }
}

/// Response wrapper used by every endpoint of the remote service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// The server-provided message, or `fallback` when there is none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Body of the refresh and logout calls.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// Body of the login call.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}
