use axum::{extract::State, response::Html, routing::get, Router};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::error::AppResult;
use crate::utils::html::escape_html;
use crate::AppState;

use super::session_id;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().route("/sleep", get(get_sleep))
}

/// Fetch the configured range, store it as CSV and show the summary
async fn get_sleep(State(state): State<Arc<AppState>>, jar: CookieJar) -> AppResult<Html<String>> {
    // No outbound call until the session proves it is logged in
    let access_token = state
        .oauth_manager
        .access_token(session_id(&jar).as_deref())
        .await?;

    let export = state.sleep_service.fetch_and_export(&access_token).await?;

    Ok(Html(format!(
        "<p>Successfully stored sleep data</p><p>{} records written to {}</p><pre>{}</pre>",
        export.rows,
        escape_html(&export.path.display().to_string()),
        escape_html(&export.summary.to_string())
    )))
}
