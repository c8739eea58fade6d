//! Site settings loaded with the `config` crate
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `config.toml` in the working directory (optional)
//! 3. environment variables prefixed with `APP_`, nested keys separated by
//!    `__` (e.g. `APP_ADMIN__EMAIL`, `APP_AUTH__ALLOWLIST=a@x.com,b@x.com`)

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site: SiteSettings,
    pub admin: AdminSettings,
    pub auth: AuthSettings,
    pub contact: ContactSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    /// Public base URL used to build links in emails
    pub url: String,
    pub name: String,
    /// Address the auth service binds to
    pub bind: String,
    /// Address the content API binds to
    pub api_bind: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            name: "Site".to_string(),
            bind: "0.0.0.0:3000".to_string(),
            api_bind: "0.0.0.0:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// The single privileged identity allowed to manage content
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Emails permitted to register
    pub allowlist: Vec<String>,
    pub session_ttl_secs: i64,
    pub session_freshness_secs: u64,
    pub verification_ttl_secs: i64,
    pub reset_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub trusted_device_ttl_secs: i64,
    pub resend_cooldown_secs: u64,
    pub reset_response_floor_ms: u64,
    /// Cron expression of the expired-row purge job
    pub purge_schedule: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            session_ttl_secs: 7 * 24 * 3600,
            session_freshness_secs: 300,
            verification_ttl_secs: 3600,
            reset_ttl_secs: 3600,
            otp_ttl_secs: 600,
            trusted_device_ttl_secs: 30 * 24 * 3600,
            resend_cooldown_secs: 60,
            reset_response_floor_ms: 400,
            purge_schedule: "0 0 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContactSettings {
    /// Operations mailbox receiving contact-form submissions
    pub recipient: String,
}

impl Default for ContactSettings {
    fn default() -> Self {
        Self {
            recipient: "operations@localhost".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` and `APP_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.allowlist")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        settings
            .try_deserialize()
            .context("failed to deserialise settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.auth.otp_ttl_secs, 600);
        assert_eq!(settings.auth.session_freshness_secs, 300);
        assert_eq!(settings.auth.resend_cooldown_secs, 60);
        assert!(settings.auth.allowlist.is_empty());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            std::env::set_var("APP_ADMIN__EMAIL", "admin@example.com");
            std::env::set_var("APP_AUTH__ALLOWLIST", "a@example.com,b@example.com");
            std::env::set_var("APP_AUTH__OTP_TTL_SECS", "120");
        }

        let settings = Settings::load().unwrap();
        assert_eq!(settings.admin.email, "admin@example.com");
        assert_eq!(
            settings.auth.allowlist,
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert_eq!(settings.auth.otp_ttl_secs, 120);

        unsafe {
            std::env::remove_var("APP_ADMIN__EMAIL");
            std::env::remove_var("APP_AUTH__ALLOWLIST");
            std::env::remove_var("APP_AUTH__OTP_TTL_SECS");
        }
    }
}
