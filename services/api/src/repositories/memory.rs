//! In-memory [`ContentRepository`] for tests

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ContentRepository, RepositoryError, RepositoryResult};
use crate::models::{ContentFilter, ContentRecord, ContentSchema, ContentStatus};

pub struct MemoryContentRepository<S: ContentSchema> {
    items: Mutex<HashMap<Uuid, ContentRecord<S::Fields>>>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ContentSchema> MemoryContentRepository<S> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            _schema: PhantomData,
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    fn matches(record: &ContentRecord<S::Fields>, filter: &ContentFilter, published_only: bool) -> bool {
        let status = if published_only {
            Some(ContentStatus::Published)
        } else {
            filter.status
        };
        if status.is_some_and(|s| record.status != s) {
            return false;
        }
        if filter.featured.is_some_and(|f| record.featured != f) {
            return false;
        }
        if let Some(category) = &filter.category {
            if S::category(&record.fields) != category.as_str() {
                return false;
            }
        }
        if let (Some(location), Some(actual)) = (&filter.location, S::location(&record.fields)) {
            if !contains_ignore_case(actual, location) {
                return false;
            }
        }
        if let Some(search) = &filter.search {
            if !contains_ignore_case(&record.title, search)
                && !contains_ignore_case(S::search_text(&record.fields), search)
            {
                return false;
            }
        }
        true
    }

    async fn filtered(
        &self,
        filter: &ContentFilter,
        published_only: bool,
    ) -> Vec<ContentRecord<S::Fields>> {
        let items = self.items.lock().await;
        let mut matching: Vec<_> = items
            .values()
            .filter(|r| Self::matches(r, filter, published_only))
            .cloned()
            .collect();
        if published_only {
            matching.sort_by(S::public_cmp);
        } else {
            matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        }
        matching
    }

    fn page(
        items: Vec<ContentRecord<S::Fields>>,
        filter: &ContentFilter,
    ) -> Vec<ContentRecord<S::Fields>> {
        items
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(0))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .collect()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl<S: ContentSchema> ContentRepository<S> for MemoryContentRepository<S> {
    async fn list_published(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        Ok(Self::page(self.filtered(filter, true).await, filter))
    }

    async fn count_published(&self, filter: &ContentFilter) -> RepositoryResult<i64> {
        Ok(self.filtered(filter, true).await.len() as i64)
    }

    async fn list_admin(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        Ok(Self::page(self.filtered(filter, false).await, filter))
    }

    async fn count_admin(&self, filter: &ContentFilter) -> RepositoryResult<i64> {
        Ok(self.filtered(filter, false).await.len() as i64)
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        include_unpublished: bool,
    ) -> RepositoryResult<Option<ContentRecord<S::Fields>>> {
        let items = self.items.lock().await;
        Ok(items
            .values()
            .find(|r| r.slug == slug && (include_unpublished || r.is_published()))
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<ContentRecord<S::Fields>>> {
        Ok(self.items.lock().await.get(&id).cloned())
    }

    async fn slugs_with_prefix(
        &self,
        prefix: &str,
        exclude: Option<Uuid>,
    ) -> RepositoryResult<Vec<String>> {
        let suffixed = format!("{prefix}-");
        let items = self.items.lock().await;
        Ok(items
            .values()
            .filter(|r| Some(r.id) != exclude)
            .filter(|r| r.slug == prefix || r.slug.starts_with(&suffixed))
            .map(|r| r.slug.clone())
            .collect())
    }

    async fn insert(&self, record: &ContentRecord<S::Fields>) -> RepositoryResult<()> {
        let mut items = self.items.lock().await;
        if items.values().any(|r| r.slug == record.slug) {
            return Err(RepositoryError::Conflict("slug is already in use".to_string()));
        }
        items.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(
        &self,
        record: &ContentRecord<S::Fields>,
        read_version: i64,
    ) -> RepositoryResult<()> {
        let mut items = self.items.lock().await;
        if items
            .values()
            .any(|r| r.id != record.id && r.slug == record.slug)
        {
            return Err(RepositoryError::Conflict("slug is already in use".to_string()));
        }
        let stored = items.get_mut(&record.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != read_version {
            return Err(RepositoryError::Conflict(format!(
                "{} was modified by another request",
                S::KIND
            )));
        }
        *stored = record.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.items.lock().await.remove(&id).is_some())
    }
}
