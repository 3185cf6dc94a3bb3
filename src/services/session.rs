/// Session Service
/// Server-side browser sessions, keyed by a random id held in a cookie.
/// Records are encrypted at rest with the session secret key.
use crate::error::{AppError, AppResult};
use crate::models::session::SessionData;
use crate::utils::fernet::Fernet;
use crate::utils::time::current_timestamp_seconds;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

struct StoredSession {
    /// Fernet token of the JSON-encoded `SessionData`
    encrypted: String,
    updated_at: i64,
}

pub struct SessionService {
    sessions: RwLock<HashMap<String, StoredSession>>,
    fernet: Fernet,
    ttl_secs: i64,
}

impl SessionService {
    pub fn new(secret_key: &str, ttl_secs: i64) -> AppResult<Self> {
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            fernet: Fernet::new(secret_key)?,
            ttl_secs,
        })
    }

    /// Create an empty session and return its id
    pub async fn create_session(&self) -> AppResult<String> {
        let session_id = Uuid::new_v4().to_string();
        self.save_session(&session_id, &SessionData::default())
            .await?;
        debug!("Created session");
        Ok(session_id)
    }

    /// Load a session; unknown, expired or undecryptable sessions read as `None`
    pub async fn get_session(&self, session_id: &str) -> AppResult<Option<SessionData>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|stored| self.decode(stored, current_timestamp_seconds())))
    }

    fn decode(&self, stored: &StoredSession, now: i64) -> Option<SessionData> {
        if now - stored.updated_at > self.ttl_secs {
            debug!("Session expired");
            return None;
        }

        match self
            .fernet
            .decrypt_json::<SessionData>(&stored.encrypted, Some(self.ttl_secs))
        {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Discarding unreadable session: {}", e);
                None
            }
        }
    }

    pub async fn save_session(&self, session_id: &str, data: &SessionData) -> AppResult<()> {
        let encrypted = self.fernet.encrypt_json(data)?;
        let now = current_timestamp_seconds();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id.to_string(),
            StoredSession {
                encrypted,
                updated_at: now,
            },
        );

        // Sweep expired sessions
        let ttl = self.ttl_secs;
        sessions.retain(|_, s| now - s.updated_at <= ttl);

        Ok(())
    }

    /// Remove and return the pending OAuth state so it can only be checked once.
    /// Read and write-back share one write guard, so concurrent callbacks
    /// cannot both see the same state.
    pub async fn take_oauth_state(&self, session_id: &str) -> AppResult<Option<String>> {
        let mut sessions = self.sessions.write().await;
        let now = current_timestamp_seconds();
        let Some(stored) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        let Some(mut data) = self.decode(stored, now) else {
            return Ok(None);
        };

        let state = data.oauth_state.take();
        if state.is_some() {
            stored.encrypted = self.fernet.encrypt_json(&data)?;
            stored.updated_at = now;
        }
        Ok(state)
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }

    /// Load an existing session or require one
    pub async fn require_session(&self, session_id: Option<&str>) -> AppResult<SessionData> {
        let session_id =
            session_id.ok_or_else(|| AppError::Unauthenticated("No session".to_string()))?;
        self.get_session(session_id)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("Session expired or unknown".to_string()))
    }
}
