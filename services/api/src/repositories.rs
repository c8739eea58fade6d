//! Repositories for content and session lookups

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ContentFilter, ContentRecord, ContentSchema};

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod sessions;

pub use postgres::PgContentRepository;
pub use sessions::PgSessionSource;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("content not found")]
    NotFound,

    /// Stale version or a unique constraint lost to a concurrent writer
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage of one content variant.
///
/// Public reads (`list_published`, `get_featured`, `get_by_slug` without
/// drafts) never return drafts.
#[async_trait]
pub trait ContentRepository<S: ContentSchema>: Send + Sync {
    /// Published items matching `filter`, in public order
    async fn list_published(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>>;

    async fn count_published(&self, filter: &ContentFilter) -> RepositoryResult<i64>;

    /// Items of any status matching `filter`, most recently updated first
    async fn list_admin(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>>;

    async fn count_admin(&self, filter: &ContentFilter) -> RepositoryResult<i64>;

    async fn get_by_slug(
        &self,
        slug: &str,
        include_unpublished: bool,
    ) -> RepositoryResult<Option<ContentRecord<S::Fields>>>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<ContentRecord<S::Fields>>>;

    /// Featured, published items in public order
    async fn get_featured(&self, limit: i64) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        self.list_published(&ContentFilter::featured(limit)).await
    }

    /// Every slug equal to `prefix` or of the form `prefix-*`, skipping the
    /// item `exclude`
    async fn slugs_with_prefix(
        &self,
        prefix: &str,
        exclude: Option<Uuid>,
    ) -> RepositoryResult<Vec<String>>;

    async fn insert(&self, record: &ContentRecord<S::Fields>) -> RepositoryResult<()>;

    /// Overwrite the stored item with `record` if it is still at
    /// `read_version`
    async fn update(
        &self,
        record: &ContentRecord<S::Fields>,
        read_version: i64,
    ) -> RepositoryResult<()>;

    /// Remove an item permanently; false if it did not exist
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}
