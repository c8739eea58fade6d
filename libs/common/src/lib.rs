//! Common library for the site services
//!
//! This crate provides shared functionality used by the auth and api
//! services: database connectivity and migrations, caching, session tokens
//! and validation, the authorization policy, outbound email, settings and
//! tracing setup.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod principal;
pub mod session;
pub mod settings;
pub mod telemetry;
