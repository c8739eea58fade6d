use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

mod emails;
mod error;
mod extract;
mod middleware;
mod models;
mod password;
mod purge;
mod rate_limiter;
mod repositories;
mod routes;
mod service;
mod session;
mod tokens;
mod validation;

use common::{
    cache::{self, Cache},
    database,
    jwt::{JwtConfig, JwtService},
    mailer::{self, MailerConfig},
    principal::Policy,
    settings::Settings,
};

use crate::{
    repositories::PgAuthRepository,
    service::{AuthOptions, AuthService},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub db_pool: PgPool,
    pub cache: Arc<dyn Cache>,
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init("auth");
    info!("Starting authentication service");

    let settings = Settings::load()?;
    if settings.admin.email.is_empty() {
        tracing::warn!("No admin email configured, content management is disabled");
    }

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::migrate(&pool).await?;

    let cache = cache::connect_from_env().await?;
    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;
    let mailer = mailer::build_mailer(MailerConfig::from_env());

    let auth = AuthService::new(
        Arc::new(PgAuthRepository::new(pool.clone())),
        cache.clone(),
        jwt_service,
        mailer,
        Policy::new(&settings.admin.email),
        AuthOptions::from_settings(&settings),
    );

    let _purge = purge::start(auth.clone(), &settings.auth.purge_schedule).await?;

    let app_state = AppState {
        auth,
        db_pool: pool,
        cache,
    };

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.site.bind).await?;
    info!("Authentication service listening on {}", settings.site.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
