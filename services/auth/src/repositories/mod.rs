//! Persistence for identities, sessions and single-use tokens

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::session::SessionSource;
use uuid::Uuid;

use crate::models::{
    NewUser, PasswordResetToken, PurgeReport, ResetRedemption, Session, TrustedDevice, TwoFactorChallenge, User,
    VerificationToken,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgAuthRepository;

/// Storage operations owned by the authentication state machine.
///
/// Every `take_*` method removes the row it returns, which makes single-use
/// redemption atomic in the backing store.
#[async_trait]
pub trait AuthRepository: SessionSource {
    // ── Users ─────────────────────────────────────────────────────────────

    async fn create_user(&self, new_user: &NewUser) -> anyhow::Result<User>;

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn mark_email_verified(&self, user_id: Uuid) -> anyhow::Result<()>;

    async fn set_two_factor(&self, user_id: Uuid, enabled: bool) -> anyhow::Result<()>;

    // ── Sessions ──────────────────────────────────────────────────────────

    async fn insert_session(&self, session: &Session) -> anyhow::Result<()>;

    async fn delete_session(&self, session_id: Uuid) -> anyhow::Result<bool>;


    // ── Email verification ────────────────────────────────────────────────

    async fn insert_verification_token(&self, token: &VerificationToken) -> anyhow::Result<()>;

    async fn take_verification_token(&self, token: &str)
    -> anyhow::Result<Option<VerificationToken>>;

    async fn delete_verification_tokens(&self, user_id: Uuid) -> anyhow::Result<()>;

    // ── Password reset ────────────────────────────────────────────────────

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> anyhow::Result<()>;

    async fn take_reset_token(&self, token: &str) -> anyhow::Result<Option<PasswordResetToken>>;

    /// Consume a reset token, store the new password hash and delete every
    /// session of its user as one unit. `None` when the token is unknown or
    /// expired at `now`; nothing but the token is touched in that case.
    async fn redeem_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ResetRedemption>>;

    // ── Two-factor ────────────────────────────────────────────────────────

    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> anyhow::Result<()>;

    async fn find_challenge(&self, token: &str) -> anyhow::Result<Option<TwoFactorChallenge>>;

    /// Attach a fresh code to a challenge and extend the challenge to the
    /// code's expiry
    async fn set_challenge_code(
        &self,
        token: &str,
        code: &str,
        code_expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Increment the failed attempt counter, returning the new count
    async fn record_failed_attempt(&self, token: &str) -> anyhow::Result<i32>;

    async fn delete_challenge(&self, token: &str) -> anyhow::Result<()>;

    async fn insert_trusted_device(&self, device: &TrustedDevice) -> anyhow::Result<()>;

    async fn find_trusted_device(&self, token: &str) -> anyhow::Result<Option<TrustedDevice>>;

    // ── Maintenance ───────────────────────────────────────────────────────

    /// Remove every row whose expiry is at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<PurgeReport>;
}
