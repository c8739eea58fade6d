//! Cached public views of published content
//!
//! Detail views are keyed by slug. List views embed a per-kind generation
//! stamp in their key, so bumping the stamp drops every cached list of that
//! kind with a single write.

use std::sync::Arc;
use std::time::Duration;

use common::cache::{Cache, get_json, set_json};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_VIEW_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ViewCache {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ViewCache {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn detail_key(kind: &str, slug: &str) -> String {
        format!("view:{kind}:slug:{slug}")
    }

    fn generation_key(kind: &str) -> String {
        format!("view:{kind}:generation")
    }

    /// Key of the list view `name` under the current generation
    pub async fn list_key(&self, kind: &str, name: &str) -> String {
        let generation = match self.cache.get(&Self::generation_key(kind)).await {
            Ok(Some(generation)) => generation,
            Ok(None) => "0".to_string(),
            Err(e) => {
                warn!("View generation read failed for {}: {}", kind, e);
                "0".to_string()
            }
        };
        format!("view:{kind}:list:{generation}:{name}")
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json(self.cache.as_ref(), key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("View cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = set_json(self.cache.as_ref(), key, value, Some(self.ttl.as_secs())).await {
            warn!("View cache write failed for {}: {}", key, e);
        }
    }

    /// Drop the detail views of `slugs` and every list view of `kind`
    pub async fn invalidate(&self, kind: &str, slugs: &[&str]) {
        for slug in slugs {
            if let Err(e) = self.cache.delete(&Self::detail_key(kind, slug)).await {
                warn!("Failed to evict {} view {}: {}", kind, slug, e);
            }
        }

        let generation = Uuid::new_v4().simple().to_string();
        if let Err(e) = self
            .cache
            .set(&Self::generation_key(kind), &generation, None)
            .await
        {
            warn!("Failed to bump {} view generation: {}", kind, e);
        }
        debug!("Invalidated {} views for {} slugs", kind, slugs.len());
    }
}
