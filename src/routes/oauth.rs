/// OAuth Routes
/// /login starts the authorization-code flow, /callback completes it
use crate::error::AppResult;
use crate::AppState;
use axum::{
    extract::State,
    http::Uri,
    response::Response,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{found, session_cookie, session_id};

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(oauth_login))
        .route(crate::config::CALLBACK_PATH, get(oauth_callback))
}

/// Redirect the browser to the provider's consent page
async fn oauth_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Response)> {
    let existing = match session_id(&jar) {
        Some(id) if state.sessions.get_session(&id).await?.is_some() => Some(id),
        _ => None,
    };
    let session_id = match existing {
        Some(id) => id,
        None => state.sessions.create_session().await?,
    };

    let authorization_url = state.oauth_manager.initiate_login(&session_id).await?;
    info!("OAuth login initiated");

    let jar = jar.add(session_cookie(
        &session_id,
        state.config.session_ttl_secs,
        state.config.secure_cookies,
    ));

    Ok((jar, found(&authorization_url)))
}

/// Provider redirect target: verify state, exchange the code, go fetch data
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    uri: Uri,
) -> AppResult<Response> {
    let callback_url = match uri.query() {
        Some(query) => format!(
            "{}?{}",
            state.oauth_manager.provider().config().redirect_uri,
            query
        ),
        None => state.oauth_manager.provider().config().redirect_uri.clone(),
    };

    debug!("OAuth callback received");

    state
        .oauth_manager
        .handle_callback(session_id(&jar).as_deref(), &callback_url)
        .await
        .map_err(|e| {
            error!("OAuth callback failed: {}", e);
            e
        })?;

    Ok(found("/sleep"))
}
