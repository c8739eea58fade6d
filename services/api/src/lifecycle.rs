//! Guarded create, update, publish and delete of content items

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::principal::{Action, Principal};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::guard::AuthorizationGuard;
use crate::models::{
    ContentFilter, ContentPatch, ContentRecord, ContentSchema, ContentStatus, FieldError,
    NewContent, Page,
};
use crate::repositories::ContentRepository;
use crate::slug::{ensure_unique_slug, generate_slug};
use crate::views::ViewCache;

const MAX_TITLE_LENGTH: usize = 200;

/// Every operation first checks the caller against the guard; every write is
/// followed by invalidation of the affected views.
pub struct ContentLifecycle<S: ContentSchema> {
    repo: Arc<dyn ContentRepository<S>>,
    guard: AuthorizationGuard,
    views: ViewCache,
}

impl<S: ContentSchema> Clone for ContentLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            guard: self.guard.clone(),
            views: self.views.clone(),
        }
    }
}

fn validate_title(title: &str) -> Result<String, FieldError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(FieldError::new("title", "title is required"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(FieldError::new(
            "title",
            format!("title must be at most {MAX_TITLE_LENGTH} characters"),
        ));
    }
    Ok(title.to_string())
}

impl<S: ContentSchema> ContentLifecycle<S> {
    pub fn new(repo: Arc<dyn ContentRepository<S>>, guard: AuthorizationGuard, views: ViewCache) -> Self {
        Self { repo, guard, views }
    }

    pub async fn create(
        &self,
        principal: Option<&Principal>,
        input: NewContent<S::Draft>,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        let principal = self.guard.require_admin(principal)?;

        let mut errors = Vec::new();
        let title = validate_title(&input.title).map_err(|e| errors.push(e)).ok();
        let fields = S::build(input.fields).map_err(|e| errors.extend(e)).ok();
        let (Some(title), Some(fields)) = (title, fields) else {
            return Err(ApiError::Validation(errors));
        };

        let slug = self.unique_slug(&title, None).await?;
        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let record = ContentRecord {
            id: Uuid::new_v4(),
            slug,
            title,
            fields,
            status,
            featured: input.featured.unwrap_or(false),
            published_at: (status == ContentStatus::Published).then_some(now),
            author_id: principal.user_id,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(&record).await?;
        info!(user_id = %principal.user_id, "Created {} {} as {}", S::KIND, record.slug, status);

        self.views.invalidate(S::KIND, &[&record.slug]).await;
        Ok(record)
    }

    /// Apply the present fields of `patch`. A title change regenerates the
    /// slug; the first move to published stamps `published_at`.
    pub async fn update(
        &self,
        principal: Option<&Principal>,
        id: Uuid,
        patch: ContentPatch<S::Patch>,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        self.guard.require_admin(principal)?;
        let current = self.load(id).await?;

        if let Some(expected) = patch.expected_version {
            if expected != current.version {
                return Err(ApiError::Conflict(format!(
                    "{} has changed since version {expected}; reload and retry",
                    S::KIND
                )));
            }
        }

        let mut next = current.clone();
        let mut errors = Vec::new();
        if let Some(title) = patch.title {
            match validate_title(&title) {
                Ok(title) => next.title = title,
                Err(e) => errors.push(e),
            }
        }
        if let Err(e) = S::apply_patch(&mut next.fields, patch.fields) {
            errors.extend(e);
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        if next.title != current.title {
            next.slug = self.unique_slug(&next.title, Some(id)).await?;
        }

        let now = Utc::now();
        if let Some(status) = patch.status {
            next.set_status(status, now);
        }
        if let Some(featured) = patch.featured {
            next.featured = featured;
        }

        self.save(&current, next, now).await
    }

    pub async fn delete(&self, principal: Option<&Principal>, id: Uuid) -> ApiResult<()> {
        let principal = self.guard.require_admin(principal)?;
        let current = self.load(id).await?;

        if !self.repo.delete(id).await? {
            return Err(ApiError::NotFound(S::KIND));
        }
        info!(user_id = %principal.user_id, "Deleted {} {}", S::KIND, current.slug);

        self.views.invalidate(S::KIND, &[&current.slug]).await;
        Ok(())
    }

    /// Flip between draft and published
    pub async fn toggle_publish_status(
        &self,
        principal: Option<&Principal>,
        id: Uuid,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        self.guard.require_admin(principal)?;
        let current = self.load(id).await?;

        let now = Utc::now();
        let mut next = current.clone();
        next.set_status(current.status.toggled(), now);
        self.save(&current, next, now).await
    }

    pub async fn toggle_featured(
        &self,
        principal: Option<&Principal>,
        id: Uuid,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        self.guard.require_admin(principal)?;
        let current = self.load(id).await?;

        let mut next = current.clone();
        next.featured = !current.featured;
        self.save(&current, next, Utc::now()).await
    }

    /// Items of every status, most recently updated first
    pub async fn list_admin(
        &self,
        principal: Option<&Principal>,
        filter: ContentFilter,
    ) -> ApiResult<Page<ContentRecord<S::Fields>>> {
        self.guard.require(principal, Action::ViewDrafts)?;

        let items = self.repo.list_admin(&filter).await?;
        let total = self.repo.count_admin(&filter).await?;
        Ok(Page {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn get_for_admin(
        &self,
        principal: Option<&Principal>,
        id: Uuid,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        self.guard.require(principal, Action::ViewDrafts)?;
        self.load(id).await
    }

    async fn load(&self, id: Uuid) -> ApiResult<ContentRecord<S::Fields>> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(ApiError::NotFound(S::KIND))
    }

    async fn unique_slug(&self, title: &str, exclude: Option<Uuid>) -> ApiResult<String> {
        let candidate = generate_slug(title);
        let existing = self.repo.slugs_with_prefix(&candidate, exclude).await?;
        Ok(ensure_unique_slug(&candidate, &existing))
    }

    /// Write `next` against the version read in `current`
    async fn save(
        &self,
        current: &ContentRecord<S::Fields>,
        mut next: ContentRecord<S::Fields>,
        now: DateTime<Utc>,
    ) -> ApiResult<ContentRecord<S::Fields>> {
        next.version = current.version + 1;
        next.updated_at = now;

        self.repo.update(&next, current.version).await?;
        info!(
            "Updated {} {} to version {} ({}, featured: {})",
            S::KIND,
            next.slug,
            next.version,
            next.status,
            next.featured
        );

        if next.slug == current.slug {
            self.views.invalidate(S::KIND, &[&next.slug]).await;
        } else {
            self.views
                .invalidate(S::KIND, &[&current.slug, &next.slug])
                .await;
        }
        Ok(next)
    }
}
