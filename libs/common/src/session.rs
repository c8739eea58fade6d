//! Session validation with a bounded freshness window
//!
//! A session token is first checked cryptographically, then resolved to a
//! [`SessionSnapshot`]. Snapshots are cached for at most the freshness window
//! (five minutes by default); a cache miss re-validates against the backing
//! store through a [`SessionSource`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{Cache, get_json, set_json};
use crate::jwt::JwtService;
use crate::principal::{Principal, Role};

/// Default freshness window for cached sessions
pub const SESSION_FRESHNESS: Duration = Duration::from_secs(300);

/// Session joined with the owning user, as cached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub email_verified: bool,
    pub expires_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            session_id: self.session_id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Backing store lookup for sessions
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Load a session by id, joined with its user. Expired rows may be returned.
    async fn load_session(&self, session_id: Uuid) -> anyhow::Result<Option<SessionSnapshot>>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token is invalid")]
    InvalidToken,

    #[error("session has expired")]
    Expired,

    #[error("session has been revoked")]
    Revoked,

    #[error("session backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub fn session_cache_key(session_id: Uuid) -> String {
    format!("session:{}", session_id)
}

/// Resolves session tokens to live sessions
#[derive(Clone)]
pub struct SessionValidator {
    jwt: JwtService,
    cache: Arc<dyn Cache>,
    source: Arc<dyn SessionSource>,
    freshness: Duration,
}

impl SessionValidator {
    pub fn new(
        jwt: JwtService,
        cache: Arc<dyn Cache>,
        source: Arc<dyn SessionSource>,
        freshness: Duration,
    ) -> Self {
        Self {
            jwt,
            cache,
            source,
            freshness,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Validate a session token and return the live session
    pub async fn validate(&self, token: &str) -> Result<SessionSnapshot, SessionError> {
        let claims = self
            .jwt
            .validate(token)
            .map_err(|_| SessionError::InvalidToken)?;

        let key = session_cache_key(claims.sid);
        match get_json::<SessionSnapshot>(self.cache.as_ref(), &key).await {
            Ok(Some(snapshot)) if snapshot.user_id == claims.sub => {
                if snapshot.expires_at <= Utc::now() {
                    return Err(SessionError::Expired);
                }
                return Ok(snapshot);
            }
            Ok(_) => {}
            Err(e) => warn!("Session cache read failed, falling back to store: {}", e),
        }

        debug!(session_id = %claims.sid, "Re-validating session against store");
        let snapshot = self
            .source
            .load_session(claims.sid)
            .await?
            .filter(|snapshot| snapshot.user_id == claims.sub)
            .ok_or(SessionError::Revoked)?;

        if snapshot.expires_at <= Utc::now() {
            return Err(SessionError::Expired);
        }

        self.remember(&snapshot).await;
        Ok(snapshot)
    }

    /// Cache a snapshot for the freshness window, capped by its expiry
    pub async fn remember(&self, snapshot: &SessionSnapshot) {
        let remaining = (snapshot.expires_at - Utc::now()).num_seconds().max(0) as u64;
        let ttl = remaining.min(self.freshness.as_secs());
        if ttl == 0 {
            return;
        }

        let key = session_cache_key(snapshot.session_id);
        if let Err(e) = set_json(self.cache.as_ref(), &key, snapshot, Some(ttl)).await {
            warn!("Failed to cache session {}: {}", snapshot.session_id, e);
        }
    }

    /// Drop a cached snapshot so the next validation hits the store
    pub async fn evict(&self, session_id: Uuid) {
        if let Err(e) = self.cache.delete(&session_cache_key(session_id)).await {
            warn!("Failed to evict session {}: {}", session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::jwt::JwtConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CountingSource {
        sessions: Mutex<HashMap<Uuid, SessionSnapshot>>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SessionSource for CountingSource {
        async fn load_session(&self, session_id: Uuid) -> anyhow::Result<Option<SessionSnapshot>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.sessions.lock().await.get(&session_id).cloned())
        }
    }

    fn snapshot(expires_in: chrono::Duration) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            name: "User".to_string(),
            role: Role::Member,
            email_verified: true,
            expires_at: Utc::now() + expires_in,
        }
    }

    fn setup() -> (SessionValidator, Arc<CountingSource>, JwtService) {
        let jwt = JwtService::new(JwtConfig::with_secret("session-test-secret-long-enough!!"))
            .unwrap();
        let source = Arc::new(CountingSource::default());
        let validator = SessionValidator::new(
            jwt.clone(),
            Arc::new(MemoryCache::new()),
            source.clone(),
            SESSION_FRESHNESS,
        );
        (validator, source, jwt)
    }

    #[tokio::test]
    async fn test_second_validation_is_served_from_cache() {
        let (validator, source, jwt) = setup();
        let snap = snapshot(chrono::Duration::hours(1));
        source.sessions.lock().await.insert(snap.session_id, snap.clone());
        let token = jwt.issue(snap.user_id, snap.session_id, snap.expires_at).unwrap();

        assert_eq!(validator.validate(&token).await.unwrap(), snap);
        assert_eq!(validator.validate(&token).await.unwrap(), snap);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evicted_and_deleted_session_is_revoked() {
        let (validator, source, jwt) = setup();
        let snap = snapshot(chrono::Duration::hours(1));
        source.sessions.lock().await.insert(snap.session_id, snap.clone());
        let token = jwt.issue(snap.user_id, snap.session_id, snap.expires_at).unwrap();
        validator.validate(&token).await.unwrap();

        source.sessions.lock().await.remove(&snap.session_id);
        validator.evict(snap.session_id).await;

        assert!(matches!(
            validator.validate(&token).await,
            Err(SessionError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let (validator, _, _) = setup();
        assert!(matches!(
            validator.validate("not-a-token").await,
            Err(SessionError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_store_row_past_expiry_is_expired() {
        let (validator, source, jwt) = setup();
        let mut snap = snapshot(chrono::Duration::hours(1));
        let token = jwt.issue(snap.user_id, snap.session_id, snap.expires_at).unwrap();
        snap.expires_at = Utc::now() - chrono::Duration::seconds(1);
        source.sessions.lock().await.insert(snap.session_id, snap);

        assert!(matches!(
            validator.validate(&token).await,
            Err(SessionError::Expired)
        ));
    }
}
