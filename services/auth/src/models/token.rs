//! Single-use tokens and two-factor state

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Email verification token sent at sign-up
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Password reset token, redeemable once within its lifetime
#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Pending second-factor sign-in.
///
/// Created when a password check succeeds for a two-factor account; `code`
/// is only set once an OTP has been dispatched.
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    pub token: String,
    pub user_id: Uuid,
    pub code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Device allowed to skip the OTP challenge
#[derive(Debug, Clone)]
pub struct TrustedDevice {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A reset token exchanged for a new password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRedemption {
    pub user_id: Uuid,
    /// Sessions deleted in the same transaction
    pub revoked_sessions: Vec<Uuid>,
}

/// Row counts removed by a purge run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub verification_tokens: u64,
    pub reset_tokens: u64,
    pub challenges: u64,
    pub trusted_devices: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.sessions
            + self.verification_tokens
            + self.reset_tokens
            + self.challenges
            + self.trusted_devices
    }
}
