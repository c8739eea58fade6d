//! In-memory [`AuthRepository`] for tests

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::session::{SessionSnapshot, SessionSource};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::AuthRepository;
use crate::models::{
    NewUser, PasswordResetToken, PurgeReport, ResetRedemption, Session, TrustedDevice, TwoFactorChallenge, User,
    VerificationToken,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    verification_tokens: HashMap<String, VerificationToken>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    challenges: HashMap<String, TwoFactorChallenge>,
    trusted_devices: HashMap<String, TrustedDevice>,
}

#[derive(Default)]
pub struct MemoryAuthRepository {
    tables: Mutex<Tables>,
}

impl MemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self, user_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    pub async fn challenge(&self, token: &str) -> Option<TwoFactorChallenge> {
        self.tables.lock().await.challenges.get(token).cloned()
    }

    /// Move a challenge's code expiry into the past
    pub async fn expire_challenge_code(&self, token: &str) {
        if let Some(challenge) = self.tables.lock().await.challenges.get_mut(token) {
            challenge.code_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    /// Move every reset token's expiry into the past
    pub async fn expire_reset_tokens(&self) {
        for token in self.tables.lock().await.reset_tokens.values_mut() {
            token.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub async fn reset_token_count(&self) -> usize {
        self.tables.lock().await.reset_tokens.len()
    }
}

#[async_trait]
impl SessionSource for MemoryAuthRepository {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let tables = self.tables.lock().await;
        let Some(session) = tables.sessions.get(&session_id) else {
            return Ok(None);
        };
        let Some(user) = tables.users.get(&session.user_id) else {
            return Ok(None);
        };

        Ok(Some(SessionSnapshot {
            session_id: session.id,
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            email_verified: user.email_verified,
            expires_at: session.expires_at,
        }))
    }
}

#[async_trait]
impl AuthRepository for MemoryAuthRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == new_user.email) {
            anyhow::bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            password_hash: new_user.password_hash.clone(),
            email_verified: false,
            two_factor_enabled: false,
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_two_factor(&self, user_id: Uuid, enabled: bool) -> Result<()> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.two_factor_enabled = enabled;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.tables
            .lock()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .sessions
            .remove(&session_id)
            .is_some())
    }

    async fn insert_verification_token(&self, token: &VerificationToken) -> Result<()> {
        self.tables
            .lock()
            .await
            .verification_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn take_verification_token(&self, token: &str) -> Result<Option<VerificationToken>> {
        Ok(self.tables.lock().await.verification_tokens.remove(token))
    }

    async fn delete_verification_tokens(&self, user_id: Uuid) -> Result<()> {
        self.tables
            .lock()
            .await
            .verification_tokens
            .retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<()> {
        self.tables
            .lock()
            .await
            .reset_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn take_reset_token(&self, token: &str) -> Result<Option<PasswordResetToken>> {
        Ok(self.tables.lock().await.reset_tokens.remove(token))
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRedemption>> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.reset_tokens.remove(token) else {
            return Ok(None);
        };
        if record.expires_at <= now {
            return Ok(None);
        }
        let Some(user) = tables.users.get_mut(&record.user_id) else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.updated_at = now;

        let revoked_sessions: Vec<Uuid> = tables
            .sessions
            .values()
            .filter(|s| s.user_id == record.user_id)
            .map(|s| s.id)
            .collect();
        for id in &revoked_sessions {
            tables.sessions.remove(id);
        }

        Ok(Some(ResetRedemption {
            user_id: record.user_id,
            revoked_sessions,
        }))
    }

    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> Result<()> {
        self.tables
            .lock()
            .await
            .challenges
            .insert(challenge.token.clone(), challenge.clone());
        Ok(())
    }

    async fn find_challenge(&self, token: &str) -> Result<Option<TwoFactorChallenge>> {
        Ok(self.tables.lock().await.challenges.get(token).cloned())
    }

    async fn set_challenge_code(
        &self,
        token: &str,
        code: &str,
        code_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(challenge) = self.tables.lock().await.challenges.get_mut(token) {
            challenge.code = Some(code.to_string());
            challenge.code_expires_at = Some(code_expires_at);
            challenge.failed_attempts = 0;
            challenge.expires_at = challenge.expires_at.max(code_expires_at);
        }
        Ok(())
    }

    async fn record_failed_attempt(&self, token: &str) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.challenges.get_mut(token) {
            Some(challenge) => {
                challenge.failed_attempts += 1;
                challenge.failed_attempts
            }
            None => 0,
        })
    }

    async fn delete_challenge(&self, token: &str) -> Result<()> {
        self.tables.lock().await.challenges.remove(token);
        Ok(())
    }

    async fn insert_trusted_device(&self, device: &TrustedDevice) -> Result<()> {
        self.tables
            .lock()
            .await
            .trusted_devices
            .insert(device.token.clone(), device.clone());
        Ok(())
    }

    async fn find_trusted_device(&self, token: &str) -> Result<Option<TrustedDevice>> {
        Ok(self.tables.lock().await.trusted_devices.get(token).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let mut tables = self.tables.lock().await;

        fn purge<K, V>(map: &mut HashMap<K, V>, expired: impl Fn(&V) -> bool) -> u64 {
            let before = map.len();
            map.retain(|_, v| !expired(v));
            (before - map.len()) as u64
        }

        Ok(PurgeReport {
            sessions: purge(&mut tables.sessions, |s| s.expires_at <= now),
            verification_tokens: purge(&mut tables.verification_tokens, |t| t.expires_at <= now),
            reset_tokens: purge(&mut tables.reset_tokens, |t| t.expires_at <= now),
            challenges: purge(&mut tables.challenges, |c| c.expires_at <= now),
            trusted_devices: purge(&mut tables.trusted_devices, |d| d.expires_at <= now),
        })
    }
}
