use std::cmp::Ordering;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};

use super::{
    ColumnValue, ContentRecord, ContentSchema, FieldError, desc_nulls_last, non_blank, nullable,
    require,
};

/// Open position advertised on the careers page
pub struct Career;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CareerFields {
    pub description: String,
    pub location: String,
    pub job_type: String,
    pub requirements: String,
    pub qualifications: String,
    pub responsibilities: String,
    pub application_deadline: Option<DateTime<Utc>>,
    pub application_email: Option<String>,
    pub application_instructions: Option<String>,
    pub salary_range: Option<String>,
    pub benefits: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CareerDraft {
    pub description: String,
    pub location: String,
    pub job_type: String,
    pub requirements: String,
    pub qualifications: String,
    pub responsibilities: String,
    pub application_deadline: Option<DateTime<Utc>>,
    pub application_email: Option<String>,
    pub application_instructions: Option<String>,
    pub salary_range: Option<String>,
    pub benefits: Option<String>,
}

/// Present fields overwrite; `null` clears an optional field
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CareerPatch {
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub requirements: Option<String>,
    pub qualifications: Option<String>,
    pub responsibilities: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub application_deadline: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "nullable")]
    pub application_email: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub application_instructions: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub salary_range: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub benefits: Option<Option<String>>,
}

impl ContentSchema for Career {
    type Fields = CareerFields;
    type Draft = CareerDraft;
    type Patch = CareerPatch;

    const KIND: &'static str = "career";
    const TABLE: &'static str = "careers";
    const COLUMNS: &'static [&'static str] = &[
        "description",
        "location",
        "job_type",
        "requirements",
        "qualifications",
        "responsibilities",
        "application_deadline",
        "application_email",
        "application_instructions",
        "salary_range",
        "benefits",
    ];
    const SEARCH_COLUMN: &'static str = "description";
    const CATEGORY_COLUMN: &'static str = "job_type";
    const LOCATION_COLUMN: Option<&'static str> = Some("location");
    const PUBLIC_ORDER: &'static str =
        "application_deadline DESC NULLS LAST, published_at DESC NULLS LAST, created_at DESC";

    fn build(draft: CareerDraft) -> Result<CareerFields, Vec<FieldError>> {
        let fields = CareerFields {
            description: draft.description.trim().to_string(),
            location: draft.location.trim().to_string(),
            job_type: draft.job_type.trim().to_string(),
            requirements: draft.requirements.trim().to_string(),
            qualifications: draft.qualifications.trim().to_string(),
            responsibilities: draft.responsibilities.trim().to_string(),
            application_deadline: draft.application_deadline,
            application_email: non_blank(draft.application_email),
            application_instructions: non_blank(draft.application_instructions),
            salary_range: non_blank(draft.salary_range),
            benefits: non_blank(draft.benefits),
        };
        validate(&fields)?;
        Ok(fields)
    }

    fn apply_patch(fields: &mut CareerFields, patch: CareerPatch) -> Result<(), Vec<FieldError>> {
        let required = [
            (&mut fields.description, patch.description),
            (&mut fields.location, patch.location),
            (&mut fields.job_type, patch.job_type),
            (&mut fields.requirements, patch.requirements),
            (&mut fields.qualifications, patch.qualifications),
            (&mut fields.responsibilities, patch.responsibilities),
        ];
        for (slot, value) in required {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        }

        if let Some(deadline) = patch.application_deadline {
            fields.application_deadline = deadline;
        }
        let optional = [
            (&mut fields.application_email, patch.application_email),
            (&mut fields.application_instructions, patch.application_instructions),
            (&mut fields.salary_range, patch.salary_range),
            (&mut fields.benefits, patch.benefits),
        ];
        for (slot, value) in optional {
            if let Some(value) = value {
                *slot = non_blank(value);
            }
        }

        validate(fields)
    }

    fn values(fields: &CareerFields) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(fields.description.clone()),
            ColumnValue::Text(fields.location.clone()),
            ColumnValue::Text(fields.job_type.clone()),
            ColumnValue::Text(fields.requirements.clone()),
            ColumnValue::Text(fields.qualifications.clone()),
            ColumnValue::Text(fields.responsibilities.clone()),
            ColumnValue::OptionalTimestamp(fields.application_deadline),
            ColumnValue::OptionalText(fields.application_email.clone()),
            ColumnValue::OptionalText(fields.application_instructions.clone()),
            ColumnValue::OptionalText(fields.salary_range.clone()),
            ColumnValue::OptionalText(fields.benefits.clone()),
        ]
    }

    fn from_row(row: &PgRow) -> Result<CareerFields, sqlx::Error> {
        Ok(CareerFields {
            description: row.try_get("description")?,
            location: row.try_get("location")?,
            job_type: row.try_get("job_type")?,
            requirements: row.try_get("requirements")?,
            qualifications: row.try_get("qualifications")?,
            responsibilities: row.try_get("responsibilities")?,
            application_deadline: row.try_get("application_deadline")?,
            application_email: row.try_get("application_email")?,
            application_instructions: row.try_get("application_instructions")?,
            salary_range: row.try_get("salary_range")?,
            benefits: row.try_get("benefits")?,
        })
    }

    fn category(fields: &CareerFields) -> &str {
        &fields.job_type
    }

    fn location(fields: &CareerFields) -> Option<&str> {
        Some(&fields.location)
    }

    fn search_text(fields: &CareerFields) -> &str {
        &fields.description
    }

    fn public_cmp(a: &ContentRecord<CareerFields>, b: &ContentRecord<CareerFields>) -> Ordering {
        desc_nulls_last(&a.fields.application_deadline, &b.fields.application_deadline)
            .then_with(|| desc_nulls_last(&a.published_at, &b.published_at))
            .then_with(|| b.created_at.cmp(&a.created_at))
    }
}

fn validate(fields: &CareerFields) -> Result<(), Vec<FieldError>> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let email = EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

    let mut errors = Vec::new();
    require(&mut errors, "description", &fields.description);
    require(&mut errors, "location", &fields.location);
    require(&mut errors, "jobType", &fields.job_type);
    require(&mut errors, "requirements", &fields.requirements);
    require(&mut errors, "qualifications", &fields.qualifications);
    require(&mut errors, "responsibilities", &fields.responsibilities);

    if let Some(address) = &fields.application_email {
        if !email.is_match(address) {
            errors.push(FieldError::new(
                "applicationEmail",
                "applicationEmail must be a valid email address",
            ));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    use crate::models::ContentStatus;

    fn draft() -> CareerDraft {
        CareerDraft {
            description: "Cover equities".to_string(),
            location: "Lagos".to_string(),
            job_type: "Full-time".to_string(),
            requirements: "CFA".to_string(),
            qualifications: "Degree".to_string(),
            responsibilities: "Research".to_string(),
            ..CareerDraft::default()
        }
    }

    fn record(
        deadline: Option<DateTime<Utc>>,
        published_at: Option<DateTime<Utc>>,
    ) -> ContentRecord<CareerFields> {
        let now = Utc::now();
        ContentRecord {
            id: Uuid::new_v4(),
            slug: Uuid::new_v4().to_string(),
            title: "Analyst".to_string(),
            fields: CareerFields {
                application_deadline: deadline,
                ..Career::build(draft()).unwrap()
            },
            status: ContentStatus::Published,
            featured: false,
            published_at,
            author_id: Uuid::new_v4(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_build_requires_every_text_field() {
        let errors = Career::build(CareerDraft::default()).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.iter().any(|e| e.field == "jobType"));
    }

    #[test]
    fn test_build_rejects_bad_application_email() {
        let errors = Career::build(CareerDraft {
            application_email: Some("not-an-email".to_string()),
            ..draft()
        })
        .unwrap_err();

        assert_eq!(errors, vec![FieldError::new(
            "applicationEmail",
            "applicationEmail must be a valid email address"
        )]);
    }

    #[test]
    fn test_patch_sets_and_clears_optional_fields() {
        let mut fields = Career::build(CareerDraft {
            salary_range: Some("Competitive".to_string()),
            ..draft()
        })
        .unwrap();

        let patch: CareerPatch = serde_json::from_value(serde_json::json!({
            "location": "Abuja",
            "salaryRange": null,
            "applicationDeadline": "2026-12-31T00:00:00Z"
        }))
        .unwrap();
        Career::apply_patch(&mut fields, patch).unwrap();

        assert_eq!(fields.location, "Abuja");
        assert_eq!(fields.salary_range, None);
        assert!(fields.application_deadline.is_some());
        assert_eq!(fields.job_type, "Full-time");
    }

    #[test]
    fn test_public_order_by_deadline_then_publication() {
        let now = Utc::now();
        let late = record(Some(now + Duration::days(30)), Some(now - Duration::days(5)));
        let soon = record(Some(now + Duration::days(3)), Some(now));
        let open_new = record(None, Some(now));
        let open_old = record(None, Some(now - Duration::days(9)));

        let mut items = vec![open_old.clone(), soon.clone(), open_new.clone(), late.clone()];
        items.sort_by(Career::public_cmp);

        let ids: Vec<Uuid> = items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![late.id, soon.id, open_new.id, open_old.id]);
    }
}
