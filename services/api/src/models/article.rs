use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};

use super::{
    ColumnValue, ContentRecord, ContentSchema, FieldError, desc_nulls_last, non_blank, nullable,
    require,
};

const WORDS_PER_MINUTE: usize = 200;
const MAX_EXCERPT_LENGTH: usize = 500;
const MAX_TAGS: usize = 20;

/// Insight article published on the site
pub struct Article;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFields {
    pub excerpt: String,
    pub content: String,
    pub category: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    /// Estimated minutes to read `content`
    pub read_time: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArticleDraft {
    pub excerpt: String,
    pub content: String,
    pub category: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArticlePatch {
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub cover_image: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl ContentSchema for Article {
    type Fields = ArticleFields;
    type Draft = ArticleDraft;
    type Patch = ArticlePatch;

    const KIND: &'static str = "article";
    const TABLE: &'static str = "articles";
    const COLUMNS: &'static [&'static str] = &[
        "excerpt",
        "content",
        "category",
        "cover_image",
        "tags",
        "read_time",
    ];
    const SEARCH_COLUMN: &'static str = "excerpt";
    const CATEGORY_COLUMN: &'static str = "category";
    const LOCATION_COLUMN: Option<&'static str> = None;
    const PUBLIC_ORDER: &'static str = "published_at DESC NULLS LAST, created_at DESC";

    fn build(draft: ArticleDraft) -> Result<ArticleFields, Vec<FieldError>> {
        let content = draft.content.trim().to_string();
        let fields = ArticleFields {
            excerpt: draft.excerpt.trim().to_string(),
            read_time: read_time(&content),
            content,
            category: draft.category.trim().to_string(),
            cover_image: non_blank(draft.cover_image),
            tags: clean_tags(draft.tags),
        };
        validate(&fields)?;
        Ok(fields)
    }

    fn apply_patch(fields: &mut ArticleFields, patch: ArticlePatch) -> Result<(), Vec<FieldError>> {
        if let Some(excerpt) = patch.excerpt {
            fields.excerpt = excerpt.trim().to_string();
        }
        if let Some(content) = patch.content {
            fields.content = content.trim().to_string();
            fields.read_time = read_time(&fields.content);
        }
        if let Some(category) = patch.category {
            fields.category = category.trim().to_string();
        }
        if let Some(cover_image) = patch.cover_image {
            fields.cover_image = non_blank(cover_image);
        }
        if let Some(tags) = patch.tags {
            fields.tags = clean_tags(tags);
        }
        validate(fields)
    }

    fn values(fields: &ArticleFields) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(fields.excerpt.clone()),
            ColumnValue::Text(fields.content.clone()),
            ColumnValue::Text(fields.category.clone()),
            ColumnValue::OptionalText(fields.cover_image.clone()),
            ColumnValue::TextArray(fields.tags.clone()),
            ColumnValue::Integer(fields.read_time),
        ]
    }

    fn from_row(row: &PgRow) -> Result<ArticleFields, sqlx::Error> {
        Ok(ArticleFields {
            excerpt: row.try_get("excerpt")?,
            content: row.try_get("content")?,
            category: row.try_get("category")?,
            cover_image: row.try_get("cover_image")?,
            tags: row.try_get("tags")?,
            read_time: row.try_get("read_time")?,
        })
    }

    fn category(fields: &ArticleFields) -> &str {
        &fields.category
    }

    fn location(_fields: &ArticleFields) -> Option<&str> {
        None
    }

    fn search_text(fields: &ArticleFields) -> &str {
        &fields.excerpt
    }

    fn public_cmp(a: &ContentRecord<ArticleFields>, b: &ContentRecord<ArticleFields>) -> Ordering {
        desc_nulls_last(&a.published_at, &b.published_at).then_with(|| b.created_at.cmp(&a.created_at))
    }
}

/// Minutes needed to read `content` at 200 words per minute, at least one.
/// Markup is ignored.
pub fn read_time(content: &str) -> i32 {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    let words = tags.replace_all(content, " ").split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            cleaned.push(tag.to_string());
        }
    }
    cleaned
}

fn validate(fields: &ArticleFields) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    require(&mut errors, "excerpt", &fields.excerpt);
    require(&mut errors, "content", &fields.content);
    require(&mut errors, "category", &fields.category);

    if fields.excerpt.chars().count() > MAX_EXCERPT_LENGTH {
        errors.push(FieldError::new(
            "excerpt",
            format!("excerpt must be at most {MAX_EXCERPT_LENGTH} characters"),
        ));
    }
    if fields.tags.len() > MAX_TAGS {
        errors.push(FieldError::new("tags", format!("at most {MAX_TAGS} tags are allowed")));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
