//! Batch runs over many tickets, one after another.

use anyhow::{anyhow, Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::errors::TriageError;
use crate::tracker::{Issue, IssueTracker};
use crate::workflows::{ProcessOutcome, Ticket, TicketProcessor};

/// Tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub transitioned: usize,
    pub escalated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Failed tickets whose items were refused registration
    pub registration_failures: usize,
    /// (ticket key, error) for every failed ticket
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        self.processed += 1;
        match outcome {
            ProcessOutcome::Unchanged => self.unchanged += 1,
            ProcessOutcome::Transitioned { .. } => self.transitioned += 1,
            ProcessOutcome::Escalated { .. } => self.escalated += 1,
        }
    }

    fn record_failure(&mut self, key: &str, error: &TriageError) {
        self.processed += 1;
        self.failed += 1;
        if error.is_registration_failure() {
            self.registration_failures += 1;
        }
        self.failures.push((key.to_string(), error.to_string()));
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} transitioned, {} escalated, {} unchanged, {} failed",
            self.processed, self.transitioned, self.escalated, self.unchanged, self.failed
        )
    }
}

/// Exclusive lock preventing overlapping runs.
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).with_context(|| format!("Failed to open lock file {}", path.display()))?;
        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    /// Fails immediately when another run holds the lock.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let path = self.path.display().to_string();
        self.lock
            .try_write()
            .map_err(|_| anyhow!("Another triage run holds {path}"))
    }
}

pub struct BatchRunner {
    processor: TicketProcessor,
    tracker: Arc<dyn IssueTracker>,
    lock_file: PathBuf,
}

impl BatchRunner {
    pub fn new(processor: TicketProcessor, tracker: Arc<dyn IssueTracker>, lock_file: impl Into<PathBuf>) -> Self {
        Self {
            processor,
            tracker,
            lock_file: lock_file.into(),
        }
    }

    /// Process every ticket the search returns, in order.
    pub async fn run_search(&self, jql: &str) -> Result<RunSummary> {
        let mut lock = RunLock::open(&self.lock_file)?;
        let _guard = lock.try_hold()?;

        let issues = self.tracker.search(jql).await.context("Ticket search failed")?;
        info!(count = issues.len(), "Found tickets");

        let mut summary = RunSummary::default();
        for issue in issues {
            let key = issue.key.clone();
            match self.process_issue(issue).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    log_failure(&key, &e);
                    summary.record_failure(&key, &e);
                }
            }
        }

        info!(%summary, "Run complete");
        Ok(summary)
    }

    /// Fetch and process the named tickets, in order.
    pub async fn run_keys(&self, keys: &[String]) -> Result<RunSummary> {
        let mut lock = RunLock::open(&self.lock_file)?;
        let _guard = lock.try_hold()?;

        let mut summary = RunSummary::default();
        for key in keys {
            let result = match self.tracker.fetch_issue(key).await {
                Ok(issue) => self.process_issue(issue).await,
                Err(e) => Err(TriageError::from(e)),
            };

            match result {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    log_failure(key, &e);
                    summary.record_failure(key, &e);
                }
            }
        }

        info!(%summary, "Run complete");
        Ok(summary)
    }

    async fn process_issue(&self, issue: Issue) -> Result<ProcessOutcome, TriageError> {
        let ticket = Ticket::from_issue(issue)?;
        self.processor.process(&ticket).await
    }
}

fn log_failure(key: &str, error: &TriageError) {
    if error.is_registration_failure() {
        warn!(ticket.key = %key, error = %error, "Item refused registration");
    } else {
        error!(ticket.key = %key, error = %error, "Ticket pass failed");
    }
}
