//! Issue tracker collaborator.

pub mod client;
pub mod errors;
pub mod types;

pub use client::{IssueTracker, JiraClient};
pub use errors::TrackerError;
pub use types::{parse_jira_date, parse_jira_timestamp, Comment, Issue};
