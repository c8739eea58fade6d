//! PostgreSQL implementation of [`AuthRepository`]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::principal::Role;
use common::session::{SessionSnapshot, SessionSource};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::AuthRepository;
use crate::models::{
    NewUser, PasswordResetToken, PurgeReport, ResetRedemption, Session, TrustedDevice, TwoFactorChallenge, User,
    VerificationToken,
};

const USER_COLUMNS: &str =
    "id, email, name, password_hash, email_verified, two_factor_enabled, role, created_at, updated_at";

/// Auth repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    /// Create a new auth repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        email_verified: row.try_get("email_verified")?,
        two_factor_enabled: row.try_get("two_factor_enabled")?,
        role: role.parse::<Role>().map_err(anyhow::Error::msg)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn challenge_from_row(row: &PgRow) -> Result<TwoFactorChallenge> {
    Ok(TwoFactorChallenge {
        token: row.try_get("token")?,
        user_id: row.try_get("user_id")?,
        code: row.try_get("code")?,
        code_expires_at: row.try_get("code_expires_at")?,
        failed_attempts: row.try_get("failed_attempts")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SessionSource for PgAuthRepository {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT s.id AS session_id, s.expires_at, u.id AS user_id, u.email, u.name,
                   u.role, u.email_verified
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role: String = row.try_get("role")?;
        Ok(Some(SessionSnapshot {
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: role.parse::<Role>().map_err(anyhow::Error::msg)?,
            email_verified: row.try_get("email_verified")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }
}

#[async_trait]
impl AuthRepository for PgAuthRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.email);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_two_factor(&self, user_id: Uuid, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE users SET two_factor_enabled = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, user_agent, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_verification_token(&self, token: &VerificationToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_verification_token(&self, token: &str) -> Result<Option<VerificationToken>> {
        let row = sqlx::query(
            r#"
            DELETE FROM verification_tokens
            WHERE token = $1
            RETURNING token, user_id, expires_at, created_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(VerificationToken {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn delete_verification_tokens(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_reset_token(&self, token: &str) -> Result<Option<PasswordResetToken>> {
        let row = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token = $1
            RETURNING token, user_id, expires_at, created_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(PasswordResetToken {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRedemption>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE token = $1 RETURNING user_id, expires_at",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: Uuid = row.try_get("user_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at <= now {
            tx.commit().await?;
            return Ok(None);
        }

        let updated =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(password_hash)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if updated == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let revoked_sessions = sqlx::query("DELETE FROM sessions WHERE user_id = $1 RETURNING id")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        tx.commit().await?;
        Ok(Some(ResetRedemption {
            user_id,
            revoked_sessions,
        }))
    }

    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_challenges
                (token, user_id, code, code_expires_at, failed_attempts, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&challenge.token)
        .bind(challenge.user_id)
        .bind(&challenge.code)
        .bind(challenge.code_expires_at)
        .bind(challenge.failed_attempts)
        .bind(challenge.expires_at)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_challenge(&self, token: &str) -> Result<Option<TwoFactorChallenge>> {
        let row = sqlx::query(
            r#"
            SELECT token, user_id, code, code_expires_at, failed_attempts, expires_at, created_at
            FROM two_factor_challenges
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn set_challenge_code(
        &self,
        token: &str,
        code: &str,
        code_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE two_factor_challenges
            SET code = $2, code_expires_at = $3, failed_attempts = 0,
                expires_at = GREATEST(expires_at, $3)
            WHERE token = $1
            "#,
        )
        .bind(token)
        .bind(code)
        .bind(code_expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failed_attempt(&self, token: &str) -> Result<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE two_factor_challenges
            SET failed_attempts = failed_attempts + 1
            WHERE token = $1
            RETURNING failed_attempts
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.unwrap_or(0))
    }

    async fn delete_challenge(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM two_factor_challenges WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_trusted_device(&self, device: &TrustedDevice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trusted_devices (token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&device.token)
        .bind(device.user_id)
        .bind(device.expires_at)
        .bind(device.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_trusted_device(&self, token: &str) -> Result<Option<TrustedDevice>> {
        let row = sqlx::query(
            "SELECT token, user_id, expires_at, created_at FROM trusted_devices WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TrustedDevice {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = PurgeReport::default();

        report.sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        report.verification_tokens =
            sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= $1")
                .bind(now)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        report.reset_tokens = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        report.challenges = sqlx::query("DELETE FROM two_factor_challenges WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        report.trusted_devices = sqlx::query("DELETE FROM trusted_devices WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(report)
    }
}
