use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

mod catalog;
mod contact;
mod error;
mod extract;
mod guard;
mod lifecycle;
mod middleware;
mod models;
mod repositories;
mod routes;
mod slug;
mod state;
mod views;

use common::{
    cache,
    database::{self, DatabaseConfig},
    jwt::{JwtConfig, JwtService},
    mailer::{self, MailerConfig},
    principal::Policy,
    session::SessionValidator,
    settings::Settings,
};

use crate::{
    models::{Article, Career},
    repositories::{PgContentRepository, PgSessionSource},
    state::{AppState, ContentHandles},
    views::{DEFAULT_VIEW_TTL, ViewCache},
};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init("api");
    info!("Starting API service");

    let settings = Settings::load()?;
    if settings.admin.email.is_empty() {
        tracing::warn!("No admin email configured, content management is disabled");
    }

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::migrate(&pool).await?;

    let cache = cache::connect_from_env().await?;
    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;
    let sessions = SessionValidator::new(
        jwt_service,
        cache.clone(),
        Arc::new(PgSessionSource::new(pool.clone())),
        Duration::from_secs(settings.auth.session_freshness_secs),
    );

    let policy = Policy::new(&settings.admin.email);
    let views = ViewCache::new(cache.clone(), DEFAULT_VIEW_TTL);

    let app_state = AppState {
        articles: ContentHandles::new(
            Arc::new(PgContentRepository::<Article>::new(pool.clone())),
            policy.clone(),
            views.clone(),
        ),
        careers: ContentHandles::new(
            Arc::new(PgContentRepository::<Career>::new(pool.clone())),
            policy,
            views,
        ),
        sessions,
        mailer: mailer::build_mailer(MailerConfig::from_env()),
        site_name: settings.site.name.clone(),
        contact_recipient: settings.contact.recipient.clone(),
        db_pool: pool,
        cache,
    };

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.site.api_bind).await?;
    info!("API service listening on {}", settings.site.api_bind);

    axum::serve(listener, app).await?;

    Ok(())
}
