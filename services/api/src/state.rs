//! Application state shared across handlers

use std::sync::Arc;

use common::{cache::Cache, mailer::Mailer, principal::Policy, session::SessionValidator};
use sqlx::PgPool;

use crate::{
    catalog::ContentCatalog,
    guard::AuthorizationGuard,
    lifecycle::ContentLifecycle,
    models::{Article, Career, ContentSchema},
    repositories::ContentRepository,
    views::ViewCache,
};

/// Admin and public entry points for one content variant
pub struct ContentHandles<S: ContentSchema> {
    pub lifecycle: ContentLifecycle<S>,
    pub catalog: ContentCatalog<S>,
}

impl<S: ContentSchema> ContentHandles<S> {
    pub fn new(repo: Arc<dyn ContentRepository<S>>, policy: Policy, views: ViewCache) -> Self {
        Self {
            lifecycle: ContentLifecycle::new(repo.clone(), AuthorizationGuard::new(policy), views.clone()),
            catalog: ContentCatalog::new(repo, views),
        }
    }
}

impl<S: ContentSchema> Clone for ContentHandles<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub articles: ContentHandles<Article>,
    pub careers: ContentHandles<Career>,
    pub sessions: SessionValidator,
    pub mailer: Arc<dyn Mailer>,
    pub site_name: String,
    /// Operations mailbox receiving contact-form submissions
    pub contact_recipient: String,
    pub db_pool: PgPool,
    pub cache: Arc<dyn Cache>,
}

/// Lets content handlers be written once and mounted per variant
pub trait HasContent<S: ContentSchema> {
    fn content(&self) -> &ContentHandles<S>;
}

impl HasContent<Article> for AppState {
    fn content(&self) -> &ContentHandles<Article> {
        &self.articles
    }
}

impl HasContent<Career> for AppState {
    fn content(&self) -> &ContentHandles<Career> {
        &self.careers
    }
}
