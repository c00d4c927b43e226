//! Auth and profile types exchanged with the backend.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use orchard_core::UserId;

/// Seconds before expiry at which a token is treated as already expired.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Lifetime assumed when the auth service omits one.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Bearer token for a signed-in user.
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Tokens kept in the HTTP session for a signed-in visitor.
///
/// Implements `Debug` manually to redact both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp after which the access token is rejected.
    pub expires_at: i64,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SessionTokens {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at - EXPIRY_LEEWAY_SECS
    }

    #[must_use]
    pub fn access(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }
}

/// A user as the auth service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// A live session: tokens plus the user they belong to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tokens: SessionTokens,
    pub user: AuthUser,
}

/// Token endpoint response.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response.expires_at.unwrap_or_else(|| {
            Utc::now().timestamp() + response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
        });
        Self {
            tokens: SessionTokens {
                access_token: response.access_token,
                refresh_token: response.refresh_token,
                expires_at,
            },
            user: response.user,
        }
    }
}

/// Sign-up answers with a session when the account is confirmed right
/// away, and with the bare user when an email confirmation is pending.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    /// `None` while the address still needs confirming.
    pub session: Option<AuthSession>,
}

impl From<SignUpResponse> for SignUpOutcome {
    fn from(response: SignUpResponse) -> Self {
        match response {
            SignUpResponse::Session(tokens) => {
                let session = AuthSession::from(tokens);
                Self {
                    user: session.user.clone(),
                    session: Some(session),
                }
            }
            SignUpResponse::User(user) => Self {
                user,
                session: None,
            },
        }
    }
}

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Insert payload for `profiles`.
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const USER: &str = r#"{"id":"0b6f3c5e-7c1a-4d8e-9a51-2f4a8a1d3e01","email":"grower@orchard.test"}"#;

    #[test]
    fn test_session_tokens_debug_redacts() {
        let tokens = SessionTokens {
            access_token: "eyJ.access.sig".to_string(),
            refresh_token: "refresh-me".to_string(),
            expires_at: 0,
        };
        let debug_output = format!("{tokens:?}");
        assert!(!debug_output.contains("eyJ.access.sig"));
        assert!(!debug_output.contains("refresh-me"));
        assert!(tokens.is_expired());
    }

    #[test]
    fn test_token_response_uses_expires_in_when_absent() {
        let json = format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_in":3600,"token_type":"bearer","user":{USER}}}"#
        );
        let session = AuthSession::from(serde_json::from_str::<TokenResponse>(&json).unwrap());
        assert!(!session.tokens.is_expired());
        assert_eq!(session.user.email.as_deref(), Some("grower@orchard.test"));
    }

    #[test]
    fn test_sign_up_without_session_is_pending() {
        let outcome = SignUpOutcome::from(serde_json::from_str::<SignUpResponse>(USER).unwrap());
        assert!(outcome.session.is_none());

        let json = format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_at":4102444800,"user":{USER}}}"#
        );
        let outcome = SignUpOutcome::from(serde_json::from_str::<SignUpResponse>(&json).unwrap());
        assert_eq!(outcome.session.map(|s| s.tokens.expires_at), Some(4_102_444_800));
    }

    #[test]
    fn test_profile_defaults_to_non_admin() {
        let profile: Profile =
            serde_json::from_str(r#"{"id":"0b6f3c5e-7c1a-4d8e-9a51-2f4a8a1d3e01"}"#).unwrap();
        assert!(!profile.is_admin);
    }
}
