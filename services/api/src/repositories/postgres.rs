//! PostgreSQL implementation of [`ContentRepository`]

use std::marker::PhantomData;

use async_trait::async_trait;
use common::error::is_unique_violation;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ContentRepository, RepositoryError, RepositoryResult};
use crate::models::{ColumnValue, ContentFilter, ContentRecord, ContentSchema, ContentStatus};

/// Content repository for one variant table
pub struct PgContentRepository<S> {
    pool: PgPool,
    _schema: PhantomData<fn() -> S>,
}

impl<S> PgContentRepository<S> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _schema: PhantomData,
        }
    }
}

impl<S> Clone for PgContentRepository<S> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

fn select_columns<S: ContentSchema>() -> String {
    format!(
        "id, slug, title, {}, status, featured, published_at, author_id, version, created_at, updated_at",
        S::COLUMNS.join(", ")
    )
}

fn record_from_row<S: ContentSchema>(row: &PgRow) -> Result<ContentRecord<S::Fields>, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(ContentRecord {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        fields: S::from_row(row)?,
        status: status
            .parse::<ContentStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        featured: row.try_get("featured")?,
        published_at: row.try_get("published_at")?,
        author_id: row.try_get("author_id")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: ColumnValue) {
    match value {
        ColumnValue::Text(v) => builder.push_bind(v),
        ColumnValue::OptionalText(v) => builder.push_bind(v),
        ColumnValue::TextArray(v) => builder.push_bind(v),
        ColumnValue::Integer(v) => builder.push_bind(v),
        ColumnValue::OptionalTimestamp(v) => builder.push_bind(v),
    };
}

fn push_filters<S: ContentSchema>(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &ContentFilter,
    published_only: bool,
) {
    builder.push(" WHERE TRUE");

    let status = if published_only {
        Some(ContentStatus::Published)
    } else {
        filter.status
    };
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = &filter.category {
        builder
            .push(format!(" AND {} = ", S::CATEGORY_COLUMN))
            .push_bind(category.clone());
    }
    if let (Some(location), Some(column)) = (&filter.location, S::LOCATION_COLUMN) {
        builder
            .push(format!(" AND {column} ILIKE "))
            .push_bind(format!("%{}%", escape_like(location)));
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(format!(" OR {} ILIKE ", S::SEARCH_COLUMN))
            .push_bind(pattern)
            .push(")");
    }
    if let Some(featured) = filter.featured {
        builder.push(" AND featured = ").push_bind(featured);
    }
}

fn map_write_error(error: sqlx::Error) -> RepositoryError {
    if is_unique_violation(&error) {
        RepositoryError::Conflict("slug is already in use".to_string())
    } else {
        RepositoryError::Database(error)
    }
}

impl<S: ContentSchema> PgContentRepository<S> {
    async fn list(
        &self,
        filter: &ContentFilter,
        published_only: bool,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {}",
            select_columns::<S>(),
            S::TABLE
        ));
        push_filters::<S>(&mut builder, filter, published_only);

        let order = if published_only {
            S::PUBLIC_ORDER
        } else {
            "updated_at DESC"
        };
        builder
            .push(format!(" ORDER BY {order} LIMIT "))
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(record_from_row::<S>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn count(&self, filter: &ContentFilter, published_only: bool) -> RepositoryResult<i64> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", S::TABLE));
        push_filters::<S>(&mut builder, filter, published_only);

        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[async_trait]
impl<S: ContentSchema> ContentRepository<S> for PgContentRepository<S> {
    async fn list_published(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        self.list(filter, true).await
    }

    async fn count_published(&self, filter: &ContentFilter) -> RepositoryResult<i64> {
        self.count(filter, true).await
    }

    async fn list_admin(
        &self,
        filter: &ContentFilter,
    ) -> RepositoryResult<Vec<ContentRecord<S::Fields>>> {
        self.list(filter, false).await
    }

    async fn count_admin(&self, filter: &ContentFilter) -> RepositoryResult<i64> {
        self.count(filter, false).await
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        include_unpublished: bool,
    ) -> RepositoryResult<Option<ContentRecord<S::Fields>>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE slug = ",
            select_columns::<S>(),
            S::TABLE
        ));
        builder.push_bind(slug.to_string());
        if !include_unpublished {
            builder
                .push(" AND status = ")
                .push_bind(ContentStatus::Published.as_str());
        }

        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(record_from_row::<S>).transpose()?)
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<ContentRecord<S::Fields>>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns::<S>(),
            S::TABLE
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row::<S>).transpose()?)
    }

    async fn slugs_with_prefix(
        &self,
        prefix: &str,
        exclude: Option<Uuid>,
    ) -> RepositoryResult<Vec<String>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT slug FROM {} WHERE (slug = ", S::TABLE));
        builder
            .push_bind(prefix.to_string())
            .push(" OR slug LIKE ")
            .push_bind(format!("{}-%", escape_like(prefix)))
            .push(")");
        if let Some(id) = exclude {
            builder.push(" AND id <> ").push_bind(id);
        }

        let slugs = builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        debug!("Found {} {} slugs sharing prefix {}", slugs.len(), S::KIND, prefix);
        Ok(slugs)
    }

    async fn insert(&self, record: &ContentRecord<S::Fields>) -> RepositoryResult<()> {
        info!("Creating {} {}", S::KIND, record.slug);

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            S::TABLE,
            select_columns::<S>()
        ));
        builder
            .push_bind(record.id)
            .push(", ")
            .push_bind(record.slug.clone())
            .push(", ")
            .push_bind(record.title.clone());
        for value in S::values(&record.fields) {
            builder.push(", ");
            push_value(&mut builder, value);
        }
        builder
            .push(", ")
            .push_bind(record.status.as_str())
            .push(", ")
            .push_bind(record.featured)
            .push(", ")
            .push_bind(record.published_at)
            .push(", ")
            .push_bind(record.author_id)
            .push(", ")
            .push_bind(record.version)
            .push(", ")
            .push_bind(record.created_at)
            .push(", ")
            .push_bind(record.updated_at)
            .push(")");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn update(
        &self,
        record: &ContentRecord<S::Fields>,
        read_version: i64,
    ) -> RepositoryResult<()> {
        info!("Updating {} {} (version {})", S::KIND, record.id, record.version);

        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET slug = ", S::TABLE));
        builder
            .push_bind(record.slug.clone())
            .push(", title = ")
            .push_bind(record.title.clone());
        for (column, value) in S::COLUMNS.iter().zip(S::values(&record.fields)) {
            builder.push(format!(", {column} = "));
            push_value(&mut builder, value);
        }
        builder
            .push(", status = ")
            .push_bind(record.status.as_str())
            .push(", featured = ")
            .push_bind(record.featured)
            .push(", published_at = ")
            .push_bind(record.published_at)
            .push(", version = ")
            .push_bind(record.version)
            .push(", updated_at = ")
            .push_bind(record.updated_at)
            .push(" WHERE id = ")
            .push_bind(record.id)
            .push(" AND version = ")
            .push_bind(read_version);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = $1", S::TABLE))
            .bind(record.id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Err(RepositoryError::Conflict(format!(
                "{} was modified by another request",
                S::KIND
            )))
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        info!("Deleting {} {}", S::KIND, id);

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", S::TABLE))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
