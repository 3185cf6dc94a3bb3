/// OAuth Provider
/// Authorization-code flow against the Oura cloud endpoints
use crate::config::Config;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

/// OAuth provider configuration
#[derive(Clone)]
pub struct OAuthProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

impl OAuthProviderConfig {
    pub fn oura(config: &Config) -> Self {
        Self {
            name: "oura".to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri(),
        }
    }
}

/// OAuth token response from provider
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Query parameters the provider appends to the redirect URI
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResponse {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationResponse {
    /// Parse the full callback URL the browser was redirected to
    pub fn from_callback_url(callback_url: &str) -> AppResult<Self> {
        let url = Url::parse(callback_url)
            .map_err(|e| AppError::BadRequest(format!("Invalid callback URL: {}", e)))?;

        let mut response = Self {
            code: None,
            state: None,
            error: None,
            error_description: None,
        };

        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => response.code = value,
                "state" => response.state = value,
                "error" => response.error = value,
                "error_description" => response.error_description = value,
                _ => {}
            }
        }

        Ok(response)
    }
}

/// OAuth provider trait
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &OAuthProviderConfig;

    /// Build the consent page URL for one authorization attempt
    fn get_authorization_url(&self, state: &str) -> AppResult<String>;

    /// Exchange authorization code for tokens
    async fn exchange_code(&self, code: &str) -> AppResult<OAuthTokenResponse>;
}

pub struct OuraOAuthProvider {
    config: OAuthProviderConfig,
    client: Client,
}

impl OuraOAuthProvider {
    pub fn new(config: OAuthProviderConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl OAuthProvider for OuraOAuthProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &OAuthProviderConfig {
        &self.config
    }

    fn get_authorization_url(&self, state: &str) -> AppResult<String> {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state),
        ];

        let scope_str = self.config.scopes.join(" ");
        if !scope_str.is_empty() {
            params.push(("scope", scope_str.as_str()));
        }

        let url = Url::parse_with_params(&self.config.authorize_url, &params)
            .map_err(|e| AppError::Internal(format!("Failed to build auth URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<OAuthTokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        debug!("Exchanging code for token with {}", self.config.name);

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Token exchange failed: {}", e);
                AppError::from_provider("Token exchange failed", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {} - {}", status, error_text);
            return Err(AppError::ProviderUnavailable(format!(
                "Token exchange failed: {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::from_provider("Failed to read token response", e))?;

        let token_response: OAuthTokenResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse token response: {}", e);
            AppError::MalformedResponse(format!("Failed to parse token response: {}", e))
        })?;

        debug!("Token exchange successful for {}", self.config.name);
        Ok(token_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> OuraOAuthProvider {
        OuraOAuthProvider::new(
            OAuthProviderConfig {
                name: "oura".to_string(),
                client_id: "client-1".to_string(),
                client_secret: "secret-1".to_string(),
                authorize_url: format!("{}/oauth/authorize", base),
                token_url: format!("{}/oauth/token", base),
                scopes: vec![],
                redirect_uri: "http://localhost:8080/callback".to_string(),
            },
            Client::new(),
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = provider("https://cloud.ouraring.com")
            .get_authorization_url("xyz")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/oauth/authorize");

        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("client_id".into(), "client-1".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:8080/callback".into()
        )));
        assert!(!pairs.iter().any(|(k, _)| k == "scope"));
        assert!(!url.contains("secret-1"));
    }

    #[test]
    fn test_scopes_joined() {
        let mut p = provider("https://cloud.ouraring.com");
        p.config.scopes = vec!["email".into(), "daily".into()];
        let url = p.get_authorization_url("s").unwrap();
        assert!(url.contains("scope=email+daily"));
    }

    #[test]
    fn test_parse_callback_url() {
        let response = AuthorizationResponse::from_callback_url(
            "http://localhost:8080/callback?code=abc&state=s%20t",
        )
        .unwrap();
        assert_eq!(response.code.as_deref(), Some("abc"));
        assert_eq!(response.state.as_deref(), Some("s t"));
        assert_eq!(response.error, None);

        let denied = AuthorizationResponse::from_callback_url(
            "http://localhost:8080/callback?error=access_denied",
        )
        .unwrap();
        assert_eq!(denied.error.as_deref(), Some("access_denied"));
        assert_eq!(denied.code, None);
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "token_type": "bearer",
                "expires_in": 86400,
                "refresh_token": "refresh-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(&server.uri())
            .exchange_code("the-code")
            .await
            .unwrap();
        assert_eq!(token.access_token, "access-1");
        assert_eq!(token.expires_in, Some(86400));
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).exchange_code("bad").await;
        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_exchange_code_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).exchange_code("c").await;
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }
}
