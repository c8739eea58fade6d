//! Public, cached reads of published content

use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::models::{ContentFilter, ContentRecord, ContentSchema, Page};
use crate::repositories::ContentRepository;
use crate::views::ViewCache;

/// Number of items on the recent-articles rail
pub const RECENT_LIMIT: i64 = 8;

pub struct ContentCatalog<S: ContentSchema> {
    repo: Arc<dyn ContentRepository<S>>,
    views: ViewCache,
}

impl<S: ContentSchema> Clone for ContentCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            views: self.views.clone(),
        }
    }
}

/// Cache name of a public listing
fn list_name(filter: &ContentFilter) -> String {
    format!(
        "page:{}:{}:c={}:l={}:s={}:f={}",
        filter.limit,
        filter.offset,
        filter.category.as_deref().unwrap_or(""),
        filter.location.as_deref().unwrap_or(""),
        filter.search.as_deref().unwrap_or("").to_lowercase(),
        filter.featured.map(|f| f.to_string()).unwrap_or_default(),
    )
}

impl<S: ContentSchema> ContentCatalog<S> {
    pub fn new(repo: Arc<dyn ContentRepository<S>>, views: ViewCache) -> Self {
        Self { repo, views }
    }

    /// Published items matching `filter`; any status in `filter` is ignored
    pub async fn list_published(
        &self,
        filter: ContentFilter,
    ) -> ApiResult<Page<ContentRecord<S::Fields>>> {
        let key = self.views.list_key(S::KIND, &list_name(&filter)).await;
        if let Some(page) = self.views.get(&key).await {
            return Ok(page);
        }

        let items = self.repo.list_published(&filter).await?;
        let total = self.repo.count_published(&filter).await?;
        let page = Page {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        };
        self.views.put(&key, &page).await;
        Ok(page)
    }

    /// A published item; drafts are reported exactly like missing slugs
    pub async fn get_by_slug(&self, slug: &str) -> ApiResult<ContentRecord<S::Fields>> {
        let key = ViewCache::detail_key(S::KIND, slug);
        if let Some(record) = self.views.get(&key).await {
            return Ok(record);
        }

        let record = self
            .repo
            .get_by_slug(slug, false)
            .await?
            .ok_or(ApiError::NotFound(S::KIND))?;
        self.views.put(&key, &record).await;
        Ok(record)
    }

    pub async fn featured(&self, limit: i64) -> ApiResult<Vec<ContentRecord<S::Fields>>> {
        let key = self
            .views
            .list_key(S::KIND, &format!("featured:{limit}"))
            .await;
        if let Some(items) = self.views.get(&key).await {
            return Ok(items);
        }

        let items = self.repo.get_featured(limit).await?;
        self.views.put(&key, &items).await;
        Ok(items)
    }

    /// The most recently published items
    pub async fn recent(&self) -> ApiResult<Vec<ContentRecord<S::Fields>>> {
        let key = self.views.list_key(S::KIND, "recent").await;
        if let Some(items) = self.views.get(&key).await {
            return Ok(items);
        }

        let items = self
            .repo
            .list_published(&ContentFilter::latest(RECENT_LIMIT))
            .await?;
        self.views.put(&key, &items).await;
        Ok(items)
    }
}
