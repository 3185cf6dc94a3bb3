use serde::{Deserialize, Serialize};

/// Per-browser session state carried across /login, /callback and /sleep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Anti-forgery value issued by /login, consumed by /callback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<OAuthTokenData>,
}

/// Access token record kept in the session. Never written to disk.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokenData {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthTokenData {
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

impl std::fmt::Debug for OAuthTokenData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenData")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<i64>) -> OAuthTokenData {
        OAuthTokenData {
            access_token: "secret-access".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_in: None,
            expires_at,
            issued_at: 1_000,
            scope: None,
        }
    }

    #[test]
    fn test_expiry() {
        assert!(!token(None).is_expired(5_000));
        assert!(!token(Some(6_000)).is_expired(5_000));
        assert!(token(Some(5_000)).is_expired(5_000));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let rendered = format!("{:?}", token(None));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
