/// OAuth Manager
/// Drives the authorization-code flow and keeps its state in the browser session
use super::oauth_provider::{AuthorizationResponse, OAuthProvider, OAuthTokenResponse};
use super::session::SessionService;
use crate::error::{AppError, AppResult};
use crate::models::session::OAuthTokenData;
use crate::utils::time::current_timestamp_seconds;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OAuthManager {
    provider: Arc<dyn OAuthProvider>,
    sessions: Arc<SessionService>,
}

impl OAuthManager {
    pub fn new(provider: Arc<dyn OAuthProvider>, sessions: Arc<SessionService>) -> Self {
        Self { provider, sessions }
    }

    pub fn provider(&self) -> &dyn OAuthProvider {
        self.provider.as_ref()
    }

    /// Generate state parameter
    fn generate_state() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Start an authorization attempt: remember a fresh state in the session
    /// and return the consent page URL.
    pub async fn initiate_login(&self, session_id: &str) -> AppResult<String> {
        let state = Self::generate_state();

        let mut session = self
            .sessions
            .get_session(session_id)
            .await?
            .unwrap_or_default();
        session.oauth_state = Some(state.clone());
        self.sessions.save_session(session_id, &session).await?;

        let auth_url = self.provider.get_authorization_url(&state)?;
        debug!("Generated auth URL for {}", self.provider.name());
        Ok(auth_url)
    }

    /// Complete an authorization attempt from the full callback URL.
    ///
    /// The stored state is consumed before anything else is checked, so a
    /// given state can be redeemed at most once.
    pub async fn handle_callback(
        &self,
        session_id: Option<&str>,
        callback_url: &str,
    ) -> AppResult<()> {
        let stored_state = match session_id {
            Some(id) => self.sessions.take_oauth_state(id).await?,
            None => None,
        };

        let response = AuthorizationResponse::from_callback_url(callback_url)?;

        if let Err(e) = verify_state(stored_state.as_deref(), response.state.as_deref()) {
            if let Some(id) = session_id {
                self.sessions.delete_session(id).await;
            }
            return Err(e);
        }
        // verify_state only passes with a session present
        let Some(session_id) = session_id else {
            return Err(AppError::CsrfMismatch("No session".to_string()));
        };

        if let Some(error) = response.error {
            let description = response.error_description.unwrap_or_default();
            warn!("Authorization denied by provider: {} {}", error, description);
            return Err(AppError::Unauthenticated(format!(
                "Authorization was not granted: {}",
                error
            )));
        }

        let code = response
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

        let token_response = self.provider.exchange_code(&code).await?;
        let token = token_data_from_response(token_response, current_timestamp_seconds());

        let mut session = self
            .sessions
            .get_session(session_id)
            .await?
            .unwrap_or_default();
        session.oauth_token = Some(token);
        self.sessions.save_session(session_id, &session).await?;

        info!("OAuth login completed for provider {}", self.provider.name());
        Ok(())
    }

    /// Access token of an authenticated session
    pub async fn access_token(&self, session_id: Option<&str>) -> AppResult<String> {
        let session = self.sessions.require_session(session_id).await?;
        let token = session
            .oauth_token
            .ok_or_else(|| AppError::Unauthenticated("Not logged in".to_string()))?;

        if token.is_expired(current_timestamp_seconds()) {
            return Err(AppError::Unauthenticated(
                "Access token expired, log in again".to_string(),
            ));
        }

        Ok(token.access_token)
    }
}

/// Fail closed: both sides must be present and equal
fn verify_state(stored: Option<&str>, returned: Option<&str>) -> AppResult<()> {
    let stored = stored
        .ok_or_else(|| AppError::CsrfMismatch("No pending authorization".to_string()))?;
    let returned =
        returned.ok_or_else(|| AppError::CsrfMismatch("Missing state parameter".to_string()))?;

    if !constant_time_eq(stored.as_bytes(), returned.as_bytes()) {
        return Err(AppError::CsrfMismatch("State parameter mismatch".to_string()));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn token_data_from_response(token_response: OAuthTokenResponse, now: i64) -> OAuthTokenData {
    OAuthTokenData {
        access_token: token_response.access_token,
        token_type: token_response.token_type,
        refresh_token: token_response.refresh_token,
        expires_in: token_response.expires_in,
        expires_at: token_response.expires_in.map(|secs| now.saturating_add(secs)),
        issued_at: now,
        scope: token_response.scope,
    }
}
