//! Read-only session lookups for bearer validation

use anyhow::Result;
use async_trait::async_trait;
use common::principal::Role;
use common::session::{SessionSnapshot, SessionSource};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Resolves sessions issued by the auth service from the shared database
#[derive(Clone)]
pub struct PgSessionSource {
    pool: PgPool,
}

impl PgSessionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionSource for PgSessionSource {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT s.id, s.user_id, s.expires_at, u.email, u.name, u.role, u.email_verified
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<SessionSnapshot> {
            let role: String = row.try_get("role")?;
            Ok(SessionSnapshot {
                session_id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                email: row.try_get("email")?,
                name: row.try_get("name")?,
                role: role.parse::<Role>().map_err(anyhow::Error::msg)?,
                email_verified: row.try_get("email_verified")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }
}
