//! Content models shared by articles and careers
//!
//! Both variants share the lifecycle columns held by [`ContentRecord`]; the
//! variant-specific columns, validation and ordering live behind
//! [`ContentSchema`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use sqlx::postgres::PgRow;
use uuid::Uuid;

pub mod article;
pub mod career;

pub use article::Article;
pub use career::Career;

/// Public visibility of a content item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ContentStatus::Draft => ContentStatus::Published,
            ContentStatus::Published => ContentStatus::Draft,
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            other => Err(format!("unknown content status: {other}")),
        }
    }
}

/// A stored article or career
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord<F> {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(flatten)]
    pub fields: F,
    pub status: ContentStatus,
    pub featured: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Uuid,
    /// Incremented on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<F> ContentRecord<F> {
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }

    /// Move to `status`, stamping `published_at` the first time the item is
    /// published. An existing stamp is never changed.
    pub fn set_status(&mut self, status: ContentStatus, now: DateTime<Utc>) {
        if status == ContentStatus::Published && self.published_at.is_none() {
            self.published_at = Some(now);
        }
        self.status = status;
    }
}

/// Validation failure of a single input field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Create payload; `D` carries the variant fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContent<D> {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(flatten)]
    pub fields: D,
}

/// Partial update payload; absent fields are left untouched
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPatch<P> {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub featured: Option<bool>,
    /// Version the caller last read; a stale value is rejected
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(flatten)]
    pub fields: P,
}

/// Listing filter. `category` matches the article category or the career
/// job type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFilter {
    pub status: Option<ContentStatus>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_PUBLIC_LIMIT: i64 = 10;
pub const DEFAULT_ADMIN_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

impl ContentFilter {
    pub fn featured(limit: i64) -> Self {
        Self {
            featured: Some(true),
            limit: limit.clamp(1, MAX_LIMIT),
            ..Self::default()
        }
    }

    pub fn latest(limit: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIMIT),
            ..Self::default()
        }
    }
}

/// Query string of listing endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<ContentStatus>,
    pub category: Option<String>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn into_filter(self, default_limit: i64) -> ContentFilter {
        ContentFilter {
            status: self.status,
            category: non_blank(self.job_type.or(self.category)),
            location: non_blank(self.location),
            search: non_blank(self.search),
            featured: self.featured,
            limit: self.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

/// Pagination envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Value bound to a variant column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    OptionalText(Option<String>),
    TextArray(Vec<String>),
    Integer(i32),
    OptionalTimestamp(Option<DateTime<Utc>>),
}

/// Field set, validation, storage mapping and ordering of a content variant
pub trait ContentSchema: Send + Sync + 'static {
    type Fields: Clone
        + fmt::Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;
    type Draft: DeserializeOwned + Send + 'static;
    type Patch: DeserializeOwned + Send + 'static;

    /// Name used in cache keys, logs and error messages
    const KIND: &'static str;
    const TABLE: &'static str;
    /// Variant columns, in the order produced by [`ContentSchema::values`]
    const COLUMNS: &'static [&'static str];
    /// Column searched together with the title
    const SEARCH_COLUMN: &'static str;
    /// Column matched by [`ContentFilter::category`]
    const CATEGORY_COLUMN: &'static str;
    const LOCATION_COLUMN: Option<&'static str>;
    /// `ORDER BY` clause of public listings
    const PUBLIC_ORDER: &'static str;

    /// Validate a create payload into a complete field set
    fn build(draft: Self::Draft) -> Result<Self::Fields, Vec<FieldError>>;

    /// Apply the present fields of `patch`, then validate the result
    fn apply_patch(fields: &mut Self::Fields, patch: Self::Patch) -> Result<(), Vec<FieldError>>;

    fn values(fields: &Self::Fields) -> Vec<ColumnValue>;

    fn from_row(row: &PgRow) -> Result<Self::Fields, sqlx::Error>;

    fn category(fields: &Self::Fields) -> &str;

    fn location(fields: &Self::Fields) -> Option<&str>;

    fn search_text(fields: &Self::Fields) -> &str;

    /// Ordering of public listings, matching [`ContentSchema::PUBLIC_ORDER`]
    fn public_cmp(a: &ContentRecord<Self::Fields>, b: &ContentRecord<Self::Fields>) -> Ordering;
}

/// Distinguish an explicit `null` from an absent field
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Newest first with missing values last
pub fn desc_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_status_stamps_once() {
        let first = Utc::now();
        let mut record = ContentRecord {
            id: Uuid::new_v4(),
            slug: "s".to_string(),
            title: "S".to_string(),
            fields: (),
            status: ContentStatus::Draft,
            featured: false,
            published_at: None,
            author_id: Uuid::new_v4(),
            version: 1,
            created_at: first,
            updated_at: first,
        };

        record.set_status(ContentStatus::Published, first);
        record.set_status(ContentStatus::Draft, first + chrono::Duration::minutes(1));
        record.set_status(ContentStatus::Published, first + chrono::Duration::minutes(2));

        assert_eq!(record.published_at, Some(first));
        assert!(record.is_published());
    }

    #[test]
    fn test_list_query_clamps_and_trims() {
        let filter = ListQuery {
            job_type: Some(" Full-time ".to_string()),
            search: Some("   ".to_string()),
            limit: Some(500),
            offset: Some(-3),
            ..ListQuery::default()
        }
        .into_filter(DEFAULT_PUBLIC_LIMIT);

        assert_eq!(filter.category.as_deref(), Some("Full-time"));
        assert_eq!(filter.search, None);
        assert_eq!(filter.limit, MAX_LIMIT);
        assert_eq!(filter.offset, 0);

        assert_eq!(
            ListQuery::default().into_filter(DEFAULT_ADMIN_LIMIT).limit,
            DEFAULT_ADMIN_LIMIT
        );
    }

    #[test]
    fn test_desc_nulls_last() {
        let mut values = vec![None, Some(1), Some(3), None, Some(2)];
        values.sort_by(desc_nulls_last);
        assert_eq!(values, vec![Some(3), Some(2), Some(1), None, None]);
    }

    #[test]
    fn test_status_round_trip_and_toggle() {
        assert_eq!("published".parse::<ContentStatus>(), Ok(ContentStatus::Published));
        assert!("archived".parse::<ContentStatus>().is_err());
        assert_eq!(ContentStatus::Draft.toggled(), ContentStatus::Published);
    }
}
