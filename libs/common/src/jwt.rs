//! Session token signing and validation
//!
//! Session tokens are JWTs carrying the user id and the session id. They are
//! signed either with RS256 (PEM key pair) or HS256 (shared secret). The
//! signature only proves the token was issued by the auth service; whether
//! the session is still alive is decided by [`crate::session`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key material used to sign and verify session tokens
#[derive(Debug, Clone)]
pub enum JwtKeys {
    /// RS256 key pair; the private key is optional for verify-only services
    Rsa {
        private_key: Option<String>,
        public_key: String,
    },
    /// HS256 shared secret
    Secret(String),
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub keys: JwtKeys,
    /// Value of the `iss` claim
    pub issuer: String,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: shared HS256 secret; takes precedence over RSA keys
    /// - `JWT_PRIVATE_KEY`: Private key for signing tokens (PEM format) or path to private key file
    /// - `JWT_PUBLIC_KEY`: Public key for verifying tokens (PEM format) or path to public key file
    /// - `JWT_ISSUER`: issuer claim (default: "site-auth")
    pub fn from_env() -> Result<Self> {
        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "site-auth".to_string());

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if secret.len() < 32 {
                anyhow::bail!("JWT_SECRET must be at least 32 bytes long");
            }
            return Ok(Self {
                keys: JwtKeys::Secret(secret),
                issuer,
            });
        }

        let public_key = std::env::var("JWT_PUBLIC_KEY")
            .map_err(|_| anyhow::anyhow!("neither JWT_SECRET nor JWT_PUBLIC_KEY is set"))?;
        let public_key = read_pem(&public_key)?;

        let private_key = match std::env::var("JWT_PRIVATE_KEY") {
            Ok(value) => Some(read_pem(&value)?),
            Err(_) => None,
        };

        Ok(Self {
            keys: JwtKeys::Rsa {
                private_key,
                public_key,
            },
            issuer,
        })
    }

    /// HS256 configuration with the given secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            keys: JwtKeys::Secret(secret.into()),
            issuer: "site-auth".to_string(),
        }
    }
}

/// If the value looks like a file path, read the PEM from that file
fn read_pem(value: &str) -> Result<String> {
    if value.starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    let pem = std::fs::read_to_string(value)
        .map_err(|e| anyhow::anyhow!("Failed to read key file {}: {}", value, e))?;
    Ok(pem.trim().to_string())
}

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// User ID
    pub sub: Uuid,
    /// Session ID
    pub sid: Uuid,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
    issuer: String,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let (algorithm, encoding_key, decoding_key) = match &config.keys {
            JwtKeys::Secret(secret) => (
                Algorithm::HS256,
                Some(EncodingKey::from_secret(secret.as_bytes())),
                DecodingKey::from_secret(secret.as_bytes()),
            ),
            JwtKeys::Rsa {
                private_key,
                public_key,
            } => {
                let encoding_key = private_key
                    .as_ref()
                    .map(|pem| EncodingKey::from_rsa_pem(pem.as_bytes()))
                    .transpose()?;
                (
                    Algorithm::RS256,
                    encoding_key,
                    DecodingKey::from_rsa_pem(public_key.as_bytes())?,
                )
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            validation,
            issuer: config.issuer,
        })
    }

    /// Sign a session token valid until `expires_at`
    pub fn issue(&self, user_id: Uuid, session_id: Uuid, expires_at: DateTime<Utc>) -> Result<String> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("JWT service is configured for verification only"))?;

        let claims = SessionClaims {
            sub: user_id,
            sid: session_id,
            iss: self.issuer.clone(),
            iat: Utc::now().timestamp().max(0) as u64,
            exp: expires_at.timestamp().max(0) as u64,
        };

        let token = encode(&Header::new(self.algorithm), &claims, encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn validate(&self, token: &str) -> Result<SessionClaims> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> JwtService {
        JwtService::new(JwtConfig::with_secret("a-test-secret-that-is-long-enough!!"))
            .expect("jwt service")
    }

    #[test]
    fn test_issue_and_validate_round_trip() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = jwt
            .issue(user_id, session_id, Utc::now() + Duration::hours(1))
            .unwrap();
        let claims = jwt.validate(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.iss, "site-auth");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = service();
        let token = jwt
            .issue(Uuid::new_v4(), Uuid::new_v4(), Utc::now() - Duration::minutes(5))
            .unwrap();

        assert!(jwt.validate(&token).is_err());
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = JwtService::new(JwtConfig::with_secret("another-secret-that-is-long-enough"))
            .unwrap();
        let token = other
            .issue(Uuid::new_v4(), Uuid::new_v4(), Utc::now() + Duration::hours(1))
            .unwrap();

        assert!(service().validate(&token).is_err());
    }
}
