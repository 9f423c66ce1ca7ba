use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::TriageError;
use crate::item::aggregator::days_between;
use crate::item::ItemIdentity;
use crate::tracker::{Comment, Issue};

/// A ticket as triage sees it, built fresh for each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub key: String,
    /// Raw "Next Steps" label, which may be a value triage does not know.
    pub workflow_state: String,
    pub items: Vec<ItemIdentity>,
    pub comments: Vec<Comment>,
    pub created: Option<DateTime<Utc>>,
    pub reanalyze_request_date: Option<NaiveDate>,
    pub reprocess_request_date: Option<NaiveDate>,
}

impl Ticket {
    pub fn from_issue(issue: Issue) -> Result<Self, TriageError> {
        let items = ItemIdentity::parse_list(issue.items.as_deref().unwrap_or_default())?;
        if items.is_empty() {
            return Err(TriageError::NoItems { key: issue.key });
        }

        Ok(Self {
            key: issue.key,
            workflow_state: issue.workflow_state.unwrap_or_default(),
            items,
            comments: issue.comments,
            created: issue.created,
            reanalyze_request_date: issue.reanalyze_request_date,
            reprocess_request_date: issue.reprocess_request_date,
        })
    }

    pub fn last_comment_time(&self) -> Option<DateTime<Utc>> {
        self.comments.iter().map(|comment| comment.created).max()
    }

    /// Days since the newest comment, or since creation for a ticket without comments.
    pub fn days_since_comment(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_comment_time()
            .or(self.created)
            .map(|since| days_between(since, now))
    }
}
