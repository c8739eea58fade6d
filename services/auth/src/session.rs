//! Session issuance and revocation

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::session::{SessionError, SessionSnapshot, SessionValidator};
use tracing::info;
use uuid::Uuid;

use crate::models::{IssuedSession, Session, SessionMeta, User};
use crate::repositories::AuthRepository;

/// Owns the session rows and keeps the freshness cache in step with them
#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn AuthRepository>,
    validator: SessionValidator,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn AuthRepository>, validator: SessionValidator, ttl: Duration) -> Self {
        Self {
            repo,
            validator,
            ttl,
        }
    }

    /// Create a session for `user` and sign its bearer token
    pub async fn issue(&self, user: &User, meta: &SessionMeta) -> Result<IssuedSession> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_agent: meta.user_agent.clone(),
            expires_at: now + self.ttl,
            created_at: now,
        };
        self.repo.insert_session(&session).await?;

        let token = self
            .validator
            .jwt()
            .issue(user.id, session.id, session.expires_at)?;

        self.validator
            .remember(&SessionSnapshot {
                session_id: session.id,
                user_id: user.id,
                email: user.email.clone(),
                name: user.name.clone(),
                role: user.role,
                email_verified: user.email_verified,
                expires_at: session.expires_at,
            })
            .await;

        info!(user_id = %user.id, session_id = %session.id, "Session issued");
        Ok(IssuedSession {
            token,
            session_id: session.id,
            expires_at: session.expires_at,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<SessionSnapshot, SessionError> {
        self.validator.validate(token).await
    }

    /// Revoke one session; returns whether it existed
    pub async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        let existed = self.repo.delete_session(session_id).await?;
        self.validator.evict(session_id).await;
        info!(session_id = %session_id, "Session revoked");
        Ok(existed)
    }

    /// Drop cached snapshots of sessions already deleted from the store
    pub async fn evict_all(&self, session_ids: &[Uuid]) {
        for id in session_ids {
            self.validator.evict(*id).await;
        }
    }
}
