use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde_json::Value;

use super::errors::TrackerError;
use crate::config::JiraFields;

/// A ticket comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub body: String,
    pub created: DateTime<Utc>,
}

/// Tracker fields consumed by triage, extracted from an issue payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Issue {
    pub key: String,
    pub workflow_state: Option<String>,
    pub items: Option<String>,
    pub reanalyze_request_date: Option<NaiveDate>,
    pub reprocess_request_date: Option<NaiveDate>,
    pub created: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
}

impl Issue {
    pub fn from_json(issue: &Value, fields: &JiraFields) -> Result<Self, TrackerError> {
        let key = issue
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::InvalidResponse {
                message: "issue payload has no key".to_string(),
            })?
            .to_string();

        let empty = Value::Null;
        let issue_fields = issue.get("fields").unwrap_or(&empty);

        let comments = issue_fields
            .get("comment")
            .and_then(|c| c.get("comments"))
            .and_then(Value::as_array)
            .map(|comments| {
                comments
                    .iter()
                    .filter_map(|comment| {
                        let created = comment
                            .get("created")
                            .and_then(Value::as_str)
                            .and_then(parse_jira_timestamp)?;
                        let body = comment
                            .get("body")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Some(Comment { body, created })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            key,
            workflow_state: select_value(issue_fields.get(&fields.workflow_state)),
            items: issue_fields
                .get(&fields.items)
                .and_then(Value::as_str)
                .map(str::to_string),
            reanalyze_request_date: date_field(issue_fields, &fields.reanalyze_request_date),
            reprocess_request_date: date_field(issue_fields, &fields.reprocess_request_date),
            created: issue_fields
                .get("created")
                .and_then(Value::as_str)
                .and_then(parse_jira_timestamp),
            comments,
        })
    }
}

/// Select-list fields arrive either as `{"value": ..}` or as a bare string.
fn select_value(field: Option<&Value>) -> Option<String> {
    match field? {
        Value::String(value) => Some(value.clone()),
        Value::Object(object) => object.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn date_field(fields: &Value, field_id: &str) -> Option<NaiveDate> {
    fields.get(field_id).and_then(Value::as_str).and_then(parse_jira_date)
}

/// Calendar date of a Jira date or timestamp, in the offset it was entered with.
pub fn parse_jira_date(value: &str) -> Option<NaiveDate> {
    DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|stamp| stamp.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

/// Parse a Jira timestamp (`2014-10-06T14:03:56.000-0400`) or date (`2014-10-06`).
pub fn parse_jira_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|stamp| stamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|stamp| stamp.and_utc())
        })
}
