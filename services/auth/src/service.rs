//! Authentication state machine
//!
//! Accounts move from pending verification to verified; sign-in yields either
//! a session or, for two-factor accounts, a challenge that must be completed
//! with an emailed one-time code. Password reset redeems a single-use token
//! and revokes every existing session of the account.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use common::{
    cache::Cache,
    error::is_unique_violation,
    jwt::JwtService,
    mailer::{EmailMessage, Mailer},
    principal::{Policy, Role, normalize_email},
    session::{SessionSnapshot, SessionSource, SessionValidator},
    settings::Settings,
};
use tracing::{info, warn};

use crate::emails;
use crate::error::AuthError;
use crate::models::{
    IssuedSession, NewUser, PasswordResetToken, PurgeReport, SessionMeta, TrustedDevice,
    TwoFactorChallenge, User, VerificationToken,
};
use crate::password;
use crate::rate_limiter::{RateDecision, RateLimiter, RateLimiterConfig};
use crate::repositories::AuthRepository;
use crate::session::SessionManager;
use crate::tokens;
use crate::validation::{field, validate_email, validate_name, validate_password};

/// Wrong codes tolerated before a challenge is discarded
pub const MAX_OTP_ATTEMPTS: i32 = 5;

/// Emails permitted to register. The admin address is always included.
#[derive(Debug, Clone, Default)]
pub struct Allowlist(HashSet<String>);

impl Allowlist {
    pub fn new<I, S>(emails: I, admin_email: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: HashSet<String> = emails
            .into_iter()
            .map(|e| normalize_email(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        let admin = normalize_email(admin_email);
        if !admin.is_empty() {
            set.insert(admin);
        }
        Self(set)
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(&normalize_email(email))
    }
}

/// Tunables of the authentication flows
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub site_name: String,
    pub site_url: String,
    pub allowlist: Allowlist,
    pub session_ttl: Duration,
    pub session_freshness: std::time::Duration,
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
    pub otp_ttl: Duration,
    pub trusted_device_ttl: Duration,
    pub resend_cooldown_secs: u64,
    pub sign_in_limits: RateLimiterConfig,
    /// Minimum latency of a password reset request
    pub reset_response_floor: std::time::Duration,
}

impl AuthOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let auth = &settings.auth;
        Self {
            site_name: settings.site.name.clone(),
            site_url: settings.site.url.trim_end_matches('/').to_string(),
            allowlist: Allowlist::new(&auth.allowlist, &settings.admin.email),
            session_ttl: Duration::seconds(auth.session_ttl_secs),
            session_freshness: std::time::Duration::from_secs(auth.session_freshness_secs),
            verification_ttl: Duration::seconds(auth.verification_ttl_secs),
            reset_ttl: Duration::seconds(auth.reset_ttl_secs),
            otp_ttl: Duration::seconds(auth.otp_ttl_secs),
            trusted_device_ttl: Duration::seconds(auth.trusted_device_ttl_secs),
            resend_cooldown_secs: auth.resend_cooldown_secs,
            sign_in_limits: RateLimiterConfig::default(),
            reset_response_floor: std::time::Duration::from_millis(auth.reset_response_floor_ms),
        }
    }
}

/// Result of a correct password check
#[derive(Debug)]
pub enum SignInOutcome {
    Authenticated { session: IssuedSession, user: User },
    TwoFactorRequired { challenge_token: String },
}

/// Result of a successful second-factor check
#[derive(Debug)]
pub struct VerifiedOtp {
    pub session: IssuedSession,
    pub user: User,
    pub trusted_device_token: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn AuthRepository>,
    sessions: SessionManager,
    mailer: Arc<dyn Mailer>,
    policy: Policy,
    options: Arc<AuthOptions>,
    resend_limiter: RateLimiter,
    sign_in_limiter: RateLimiter,
}

impl AuthService {
    pub fn new<R>(
        repo: Arc<R>,
        cache: Arc<dyn Cache>,
        jwt: JwtService,
        mailer: Arc<dyn Mailer>,
        policy: Policy,
        options: AuthOptions,
    ) -> Self
    where
        R: AuthRepository + 'static,
    {
        let source: Arc<dyn SessionSource> = repo.clone();
        let repo: Arc<dyn AuthRepository> = repo;
        let validator = SessionValidator::new(jwt, cache, source, options.session_freshness);
        let sessions = SessionManager::new(repo.clone(), validator, options.session_ttl);

        Self {
            repo,
            sessions,
            mailer,
            policy,
            resend_limiter: RateLimiter::new(RateLimiterConfig::cooldown(
                options.resend_cooldown_secs,
            )),
            sign_in_limiter: RateLimiter::new(options.sign_in_limits.clone()),
            options: Arc::new(options),
        }
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Register a pending account and send its verification email
    pub async fn sign_up(&self, email: &str, name: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        field("email", validate_email(&email))?;
        field("name", validate_name(name))?;
        field("password", validate_password(password))?;

        if !self.options.allowlist.contains(&email) {
            warn!("Sign-up vetoed for an address outside the allowlist");
            return Err(AuthError::SignupNotAllowed);
        }

        if self.repo.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let role = if self.policy.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::Member
        };
        let new_user = NewUser {
            email: email.clone(),
            name: name.trim().to_string(),
            password_hash: password::hash_password(password).await?,
            role,
        };
        let user = match self.repo.create_user(&new_user).await {
            Ok(user) => user,
            Err(e) if is_duplicate(&e) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %user.id, role = %user.role, "User registered, pending verification");

        let limiter_key = format!("verify:{email}");
        self.resend_limiter.hit(&limiter_key).await;
        if let Err(e) = self.send_verification(&user).await {
            self.resend_limiter.reset(&limiter_key).await;
            return Err(e);
        }
        Ok(user)
    }

    async fn send_verification(&self, user: &User) -> Result<(), AuthError> {
        let now = Utc::now();
        let token = VerificationToken {
            token: tokens::random_token(),
            user_id: user.id,
            expires_at: now + self.options.verification_ttl,
            created_at: now,
        };
        self.repo.insert_verification_token(&token).await?;

        let link = format!(
            "{}/auth/verify-email?token={}",
            self.options.site_url, token.token
        );
        let message = emails::verification(&self.options.site_name, &user.email, &user.name, &link);
        self.dispatch(message).await?;
        info!(user_id = %user.id, "Verification email sent");
        Ok(())
    }

    /// Redeem a verification token and sign the user in
    pub async fn verify_email(
        &self,
        token: &str,
        meta: &SessionMeta,
    ) -> Result<(IssuedSession, User), AuthError> {
        let record = self
            .repo
            .take_verification_token(token)
            .await?
            .filter(|t| t.expires_at > Utc::now())
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let mut user = self
            .repo
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        self.repo.mark_email_verified(user.id).await?;
        self.repo.delete_verification_tokens(user.id).await?;
        user.email_verified = true;
        info!(user_id = %user.id, "Email verified");

        let session = self.sessions.issue(&user, meta).await?;
        Ok((session, user))
    }

    /// Send a fresh verification email. Unknown and already verified
    /// addresses succeed without sending anything.
    pub async fn send_verification_email(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        field("email", validate_email(&email))?;
        let limiter_key = format!("verify:{email}");
        self.throttle(&self.resend_limiter, &limiter_key).await?;

        match self.repo.find_user_by_email(&email).await? {
            Some(user) if !user.email_verified => {
                let sent = self.send_verification(&user).await;
                if sent.is_err() {
                    self.resend_limiter.reset(&limiter_key).await;
                }
                sent
            }
            _ => Ok(()),
        }
    }

    // ── Sign-in ───────────────────────────────────────────────────────────

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        trusted_device_token: Option<&str>,
        meta: &SessionMeta,
    ) -> Result<SignInOutcome, AuthError> {
        let email = normalize_email(email);
        let limiter_key = format!("sign-in:{email}");
        self.throttle(&self.sign_in_limiter, &limiter_key).await?;

        let Some(user) = self.repo.find_user_by_email(&email).await? else {
            password::verify_dummy(password).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash).await? {
            info!(user_id = %user.id, "Sign-in rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }
        self.sign_in_limiter.reset(&limiter_key).await;

        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if user.two_factor_enabled && !self.is_trusted_device(&user, trusted_device_token).await? {
            let now = Utc::now();
            let challenge = TwoFactorChallenge {
                token: tokens::random_token(),
                user_id: user.id,
                code: None,
                code_expires_at: None,
                failed_attempts: 0,
                expires_at: now + self.options.otp_ttl,
                created_at: now,
            };
            self.repo.insert_challenge(&challenge).await?;
            info!(user_id = %user.id, "Second factor required");
            return Ok(SignInOutcome::TwoFactorRequired {
                challenge_token: challenge.token,
            });
        }

        let session = self.sessions.issue(&user, meta).await?;
        Ok(SignInOutcome::Authenticated { session, user })
    }

    async fn is_trusted_device(&self, user: &User, token: Option<&str>) -> Result<bool, AuthError> {
        let Some(token) = token else {
            return Ok(false);
        };
        let device = self.repo.find_trusted_device(token).await?;
        Ok(device.is_some_and(|d| d.user_id == user.id && d.expires_at > Utc::now()))
    }

    // ── Two-factor ────────────────────────────────────────────────────────

    /// Email a fresh one-time code for a pending challenge
    pub async fn send_otp(&self, challenge_token: &str) -> Result<(), AuthError> {
        let challenge = self
            .repo
            .find_challenge(challenge_token)
            .await?
            .filter(|c| c.expires_at > Utc::now())
            .ok_or(AuthError::Unauthorized)?;

        let limiter_key = format!("otp:{}", challenge.user_id);
        self.throttle(&self.resend_limiter, &limiter_key).await?;

        let user = self
            .repo
            .find_user_by_id(challenge.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let code = tokens::otp_code();
        let code_expires_at = Utc::now() + self.options.otp_ttl;
        self.repo
            .set_challenge_code(challenge_token, &code, code_expires_at)
            .await?;

        let message = emails::one_time_code(
            &self.options.site_name,
            &user.email,
            &code,
            self.options.otp_ttl.num_minutes(),
        );
        if let Err(e) = self.dispatch(message).await {
            self.resend_limiter.reset(&limiter_key).await;
            return Err(e);
        }
        info!(user_id = %user.id, "One-time code sent");
        Ok(())
    }

    pub async fn verify_otp(
        &self,
        challenge_token: &str,
        code: &str,
        trust_device: bool,
        meta: &SessionMeta,
    ) -> Result<VerifiedOtp, AuthError> {
        let now = Utc::now();
        let challenge = self
            .repo
            .find_challenge(challenge_token)
            .await?
            .ok_or(AuthError::InvalidOtp)?;

        if challenge.expires_at <= now {
            self.repo.delete_challenge(challenge_token).await?;
            return Err(AuthError::InvalidOtp);
        }

        let (Some(expected), Some(code_expires_at)) = (&challenge.code, challenge.code_expires_at)
        else {
            return Err(AuthError::InvalidOtp);
        };
        if code_expires_at <= now {
            return Err(AuthError::InvalidOtp);
        }

        if !tokens::constant_time_eq(expected, code.trim()) {
            let attempts = self.repo.record_failed_attempt(challenge_token).await?;
            if attempts >= MAX_OTP_ATTEMPTS {
                warn!(user_id = %challenge.user_id, "Challenge discarded after repeated wrong codes");
                self.repo.delete_challenge(challenge_token).await?;
            }
            return Err(AuthError::InvalidOtp);
        }

        self.repo.delete_challenge(challenge_token).await?;
        let user = self
            .repo
            .find_user_by_id(challenge.user_id)
            .await?
            .ok_or(AuthError::InvalidOtp)?;

        let trusted_device_token = if trust_device {
            let device = TrustedDevice {
                token: tokens::random_token(),
                user_id: user.id,
                expires_at: now + self.options.trusted_device_ttl,
                created_at: now,
            };
            self.repo.insert_trusted_device(&device).await?;
            info!(user_id = %user.id, "Device trusted");
            Some(device.token)
        } else {
            None
        };

        let session = self.sessions.issue(&user, meta).await?;
        Ok(VerifiedOtp {
            session,
            user,
            trusted_device_token,
        })
    }

    pub async fn enable_two_factor(
        &self,
        session: &SessionSnapshot,
        password: &str,
    ) -> Result<(), AuthError> {
        self.set_two_factor(session, password, true).await
    }

    pub async fn disable_two_factor(
        &self,
        session: &SessionSnapshot,
        password: &str,
    ) -> Result<(), AuthError> {
        self.set_two_factor(session, password, false).await
    }

    async fn set_two_factor(
        &self,
        session: &SessionSnapshot,
        password: &str,
        enabled: bool,
    ) -> Result<(), AuthError> {
        let user = self
            .repo
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !password::verify_password(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        self.repo.set_two_factor(user.id, enabled).await?;
        info!(user_id = %user.id, enabled, "Two-factor setting changed");
        Ok(())
    }

    // ── Password reset ────────────────────────────────────────────────────

    /// Email a reset link when the account exists. The outcome and latency
    /// are the same for unknown addresses.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let started = Instant::now();
        let result = self.issue_reset(email).await;

        let elapsed = started.elapsed();
        if elapsed < self.options.reset_response_floor {
            tokio::time::sleep(self.options.reset_response_floor - elapsed).await;
        }
        result
    }

    async fn issue_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if validate_email(&email).is_err() {
            return Ok(());
        }
        self.throttle(&self.resend_limiter, &format!("reset:{email}"))
            .await?;

        let Some(user) = self.repo.find_user_by_email(&email).await? else {
            return Ok(());
        };

        let now = Utc::now();
        let token = PasswordResetToken {
            token: tokens::random_token(),
            user_id: user.id,
            expires_at: now + self.options.reset_ttl,
            created_at: now,
        };
        self.repo.insert_reset_token(&token).await?;

        let link = format!(
            "{}/reset-password?token={}",
            self.options.site_url, token.token
        );
        let message =
            emails::password_reset(&self.options.site_name, &user.email, &user.name, &link);
        if let Err(e) = self.dispatch(message).await {
            self.repo.take_reset_token(&token.token).await?;
            return Err(e);
        }
        info!(user_id = %user.id, "Password reset email sent");
        Ok(())
    }

    /// Redeem a reset token, set the new password and revoke all sessions
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        field("newPassword", validate_password(new_password))?;

        let hash = password::hash_password(new_password).await?;
        let redemption = self
            .repo
            .redeem_reset_token(token, &hash, Utc::now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        self.sessions.evict_all(&redemption.revoked_sessions).await;

        info!(
            user_id = %redemption.user_id,
            revoked = redemption.revoked_sessions.len(),
            "Password reset, all sessions revoked"
        );
        Ok(())
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Resolve a bearer token to its live session
    pub async fn authenticate(&self, token: &str) -> Result<SessionSnapshot, AuthError> {
        Ok(self.sessions.validate(token).await?)
    }

    pub async fn get_session(&self, session: &SessionSnapshot) -> Result<User, AuthError> {
        self.repo
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    pub async fn sign_out(&self, session: &SessionSnapshot) -> Result<(), AuthError> {
        self.sessions.revoke(session.session_id).await?;
        Ok(())
    }

    // ── Maintenance ───────────────────────────────────────────────────────

    pub async fn purge_expired(&self) -> anyhow::Result<PurgeReport> {
        let report = self.repo.purge_expired(Utc::now()).await?;
        self.resend_limiter.prune().await;
        self.sign_in_limiter.prune().await;
        Ok(report)
    }

    async fn throttle(&self, limiter: &RateLimiter, key: &str) -> Result<(), AuthError> {
        match limiter.hit(key).await {
            RateDecision::Allowed => Ok(()),
            RateDecision::Limited { retry_after } => Err(AuthError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            }),
        }
    }

    async fn dispatch(&self, message: EmailMessage) -> Result<(), AuthError> {
        self.mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(AuthError::EmailDelivery)
    }
}

fn is_duplicate(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .is_some_and(is_unique_violation)
}
