//! In-memory collaborators for triage integration tests
//!
//! Each fake keeps its state behind a `Mutex` and records every write so
//! tests can assert on exactly what a pass did.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use reingest_triage::config::ThresholdConfig;
use reingest_triage::grin::{ConversionRecord, ConversionService, GrinError};
use reingest_triage::item::{ItemIdentity, ItemStateAggregator};
use reingest_triage::repository::{
    ArchiveStore, LastErrorRecord, NamespaceInfo, QueueInfo, QueueStatus, RepositoryError, RepositoryStore, Table,
    WatchRecord,
};
use reingest_triage::tracker::{Issue, IssueTracker, TrackerError};
use reingest_triage::workflows::{Ticket, TicketProcessor};

/// Reference time for every scenario
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 10, 20, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn sample_item() -> ItemIdentity {
    ItemIdentity::new("mdp", "39015002276304")
}

/// GRIN response for the sample item: converted, never audited.
pub const SAMPLE_GRIN_TSV: &str = "Barcode\tScanned Date\tProcessed Date\tAnalyzed Date\tConverted Date\tDownloaded Date\tState\tAudit\tRubbish\tMaterial Error%\tOverall Error%\n\
    39015002276304\t2008/02/20 10:11\t2008/02/20 18:40\t2008/08/27 02:12\t2013/11/21 04:00\t2013/11/21 09:30\tCONVERTED\t\t\t0%\t2%\n";

#[derive(Default)]
struct RepositoryState {
    watched: HashMap<ItemIdentity, WatchRecord>,
    tables: HashMap<Table, HashSet<ItemIdentity>>,
    queue: HashMap<ItemIdentity, QueueInfo>,
    last_errors: HashMap<ItemIdentity, LastErrorRecord>,
    namespaces: HashMap<String, NamespaceInfo>,
    inserts: Vec<(ItemIdentity, String)>,
    lookups: usize,
}

#[derive(Default)]
pub struct FakeRepository {
    state: Mutex<RepositoryState>,
}

impl FakeRepository {
    pub fn new() -> Self {
        let repository = Self::default();
        repository.with_namespace("mdp", Some("UOM"));
        repository
    }

    pub fn with_namespace(&self, namespace: &str, grin_instance: Option<&str>) -> &Self {
        self.state.lock().unwrap().namespaces.insert(
            namespace.to_string(),
            NamespaceInfo {
                grin_instance: grin_instance.map(str::to_string),
            },
        );
        self
    }

    pub fn watch(&self, item: &ItemIdentity, requested: DateTime<Utc>, ready: bool) -> &Self {
        let record = WatchRecord {
            issue_key: Some("HTS-9999".to_string()),
            request_date: Some(requested),
            ready,
        };
        self.state.lock().unwrap().watched.insert(item.clone(), record);
        self
    }

    pub fn add_to_table(&self, table: Table, item: &ItemIdentity) -> &Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table)
            .or_default()
            .insert(item.clone());
        self
    }

    /// Put the item in the ingest queue with the given status and age.
    pub fn enqueue(&self, item: &ItemIdentity, status: QueueStatus, age_days: i64) -> &Self {
        self.add_to_table(Table::Queue, item);
        self.state.lock().unwrap().queue.insert(
            item.clone(),
            QueueInfo {
                age_days,
                status,
                last_update: days_ago(age_days),
            },
        );
        self
    }

    pub fn fail_ingest(&self, item: &ItemIdentity, detail: &str, message: &str) -> &Self {
        self.state.lock().unwrap().last_errors.insert(
            item.clone(),
            LastErrorRecord {
                detail: Some(detail.to_string()),
                message: Some(message.to_string()),
            },
        );
        self
    }

    pub fn inserts(&self) -> Vec<(ItemIdentity, String)> {
        self.state.lock().unwrap().inserts.clone()
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }
}

#[async_trait]
impl RepositoryStore for FakeRepository {
    async fn watch_record(&self, item: &ItemIdentity) -> Result<Option<WatchRecord>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state.watched.get(item).cloned())
    }

    async fn insert_watch(&self, item: &ItemIdentity, issue_key: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.watched.contains_key(item) {
            return Ok(false);
        }
        state.watched.insert(
            item.clone(),
            WatchRecord {
                issue_key: Some(issue_key.to_string()),
                request_date: Some(now()),
                ready: false,
            },
        );
        state.inserts.push((item.clone(), issue_key.to_string()));
        Ok(true)
    }

    async fn queue_info(&self, item: &ItemIdentity) -> Result<Option<QueueInfo>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state.queue.get(item).cloned())
    }

    async fn last_error(&self, item: &ItemIdentity) -> Result<Option<LastErrorRecord>, RepositoryError> {
        Ok(self.state.lock().unwrap().last_errors.get(item).cloned())
    }

    async fn namespace_info(&self, namespace: &str) -> Result<Option<NamespaceInfo>, RepositoryError> {
        Ok(self.state.lock().unwrap().namespaces.get(namespace).cloned())
    }

    async fn table_has_item(&self, table: Table, item: &ItemIdentity) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        if table == Table::Watched {
            return Ok(state.watched.contains_key(item));
        }
        Ok(state.tables.get(&table).is_some_and(|items| items.contains(item)))
    }
}

#[derive(Default)]
pub struct FakeConversion {
    records: Mutex<HashMap<(String, String), ConversionRecord>>,
    lookups: Mutex<Vec<(String, String)>>,
}

impl FakeConversion {
    pub fn with_record(self, instance: &str, barcode: &str, tsv: &str) -> Self {
        if let Some(record) = ConversionRecord::from_tsv(tsv) {
            self.records
                .lock()
                .unwrap()
                .insert((instance.to_string(), barcode.to_uppercase()), record);
        }
        self
    }

    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionService for FakeConversion {
    async fn barcode_record(&self, instance: &str, barcode: &str) -> Result<Option<ConversionRecord>, GrinError> {
        let key = (instance.to_string(), barcode.to_uppercase());
        self.lookups.lock().unwrap().push(key.clone());
        Ok(self.records.lock().unwrap().get(&key).cloned())
    }
}

#[derive(Default)]
pub struct FakeArchive {
    packages: Mutex<HashMap<ItemIdentity, DateTime<Utc>>>,
}

impl FakeArchive {
    pub fn with_package(self, item: &ItemIdentity, modified: DateTime<Utc>) -> Self {
        self.packages.lock().unwrap().insert(item.clone(), modified);
        self
    }
}

#[async_trait]
impl ArchiveStore for FakeArchive {
    async fn package_modified(&self, item: &ItemIdentity) -> io::Result<Option<DateTime<Utc>>> {
        Ok(self.packages.lock().unwrap().get(item).copied())
    }
}

#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<HashMap<String, Issue>>,
    state_updates: Mutex<Vec<(String, String)>>,
    comments: Mutex<Vec<(String, String)>>,
}

impl FakeTracker {
    pub fn with_issue(self, issue: Issue) -> Self {
        self.issues.lock().unwrap().insert(issue.key.clone(), issue);
        self
    }

    pub fn state_updates(&self) -> Vec<(String, String)> {
        self.state_updates.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    /// All comment bodies, joined for substring assertions.
    pub fn comment_text(&self) -> String {
        self.comments()
            .into_iter()
            .map(|(_, body)| body)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn fetch_issue(&self, key: &str) -> Result<Issue, TrackerError> {
        self.issues
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| TrackerError::Status {
                status: 404,
                operation: format!("fetch {key}"),
                message: "Issue Does Not Exist".to_string(),
            })
    }

    async fn search(&self, _jql: &str) -> Result<Vec<Issue>, TrackerError> {
        let mut issues: Vec<Issue> = self.issues.lock().unwrap().values().cloned().collect();
        issues.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(issues)
    }

    async fn set_workflow_state(&self, key: &str, state: &str) -> Result<(), TrackerError> {
        self.state_updates
            .lock()
            .unwrap()
            .push((key.to_string(), state.to_string()));
        if let Some(issue) = self.issues.lock().unwrap().get_mut(key) {
            issue.workflow_state = Some(state.to_string());
        }
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        self.comments.lock().unwrap().push((key.to_string(), body.to_string()));
        Ok(())
    }
}

/// Collaborators wired into a processor, with handles kept for assertions.
pub struct Harness {
    pub repository: Arc<FakeRepository>,
    pub conversion: Arc<FakeConversion>,
    pub archive: Arc<FakeArchive>,
    pub tracker: Arc<FakeTracker>,
}

impl Harness {
    pub fn new(repository: FakeRepository, conversion: FakeConversion, archive: FakeArchive) -> Self {
        Self {
            repository: Arc::new(repository),
            conversion: Arc::new(conversion),
            archive: Arc::new(archive),
            tracker: Arc::new(FakeTracker::default()),
        }
    }

    pub fn with_tracker(mut self, tracker: FakeTracker) -> Self {
        self.tracker = Arc::new(tracker);
        self
    }

    pub fn aggregator(&self) -> ItemStateAggregator {
        ItemStateAggregator::new(self.repository.clone(), self.conversion.clone(), self.archive.clone())
    }

    pub fn processor(&self) -> TicketProcessor {
        TicketProcessor::new(self.aggregator(), self.tracker.clone(), ThresholdConfig::default())
    }
}

pub fn issue(key: &str, state: &str, items: &str) -> Issue {
    Issue {
        key: key.to_string(),
        workflow_state: Some(state.to_string()),
        items: Some(items.to_string()),
        created: Some(days_ago(30)),
        ..Issue::default()
    }
}

pub fn ticket(state: &str, items: &str) -> Ticket {
    Ticket::from_issue(issue("HTS-9999", state, items)).unwrap()
}
