//! Read-through view of one item's state across the ingest database, the
//! conversion service, and the archival repository.
//!
//! Nothing is cached: every accessor goes back to its collaborator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::identity::ItemIdentity;
use crate::errors::TriageError;
use crate::grin::{ConversionInfo, ConversionRecord, ConversionService};
use crate::repository::{ArchiveStore, LastErrorRecord, QueueInfo, RepositoryStore, Table, WatchRecord};

const CONVERSION_FAILURE_DETAIL: &str = "Unexpected GRIN state";
const CONVERSION_FAILURE_MESSAGE: &str = "could not convert";

/// Snapshot of everything known about an item, for operator inspection.
#[derive(Debug, Clone, Serialize)]
pub struct ItemState {
    pub item: String,
    pub watched: bool,
    pub ready: bool,
    pub request_date: Option<DateTime<Utc>>,
    pub queue_info: Option<QueueInfo>,
    pub grin_instance: Option<String>,
    pub conversion_info: Option<ConversionInfo>,
    /// Set when the conversion service could not be consulted for this item.
    pub conversion_error: Option<String>,
    pub repository_zip_date: Option<DateTime<Utc>>,
    pub last_error: Option<LastErrorRecord>,
}

#[derive(Clone)]
pub struct ItemStateAggregator {
    repository: Arc<dyn RepositoryStore>,
    conversion: Arc<dyn ConversionService>,
    archive: Arc<dyn ArchiveStore>,
}

impl ItemStateAggregator {
    pub fn new(
        repository: Arc<dyn RepositoryStore>,
        conversion: Arc<dyn ConversionService>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            repository,
            conversion,
            archive,
        }
    }

    pub(crate) fn repository(&self) -> &Arc<dyn RepositoryStore> {
        &self.repository
    }

    pub async fn watch_record(&self, item: &ItemIdentity) -> Result<Option<WatchRecord>, TriageError> {
        Ok(self.repository.watch_record(item).await?)
    }

    pub async fn is_watched(&self, item: &ItemIdentity) -> Result<bool, TriageError> {
        Ok(self.watch_record(item).await?.is_some())
    }

    /// Whether the tracking record reports a terminal outcome.
    pub async fn is_ready(&self, item: &ItemIdentity) -> Result<bool, TriageError> {
        Ok(self.watch_record(item).await?.is_some_and(|record| record.ready))
    }

    pub async fn request_date(&self, item: &ItemIdentity) -> Result<Option<DateTime<Utc>>, TriageError> {
        Ok(self.watch_record(item).await?.and_then(|record| record.request_date))
    }

    /// Fractional days between registration and `now`.
    pub async fn request_age_days(&self, item: &ItemIdentity, now: DateTime<Utc>) -> Result<Option<f64>, TriageError> {
        Ok(self.request_date(item).await?.map(|requested| days_between(requested, now)))
    }

    pub async fn queue_info(&self, item: &ItemIdentity) -> Result<Option<QueueInfo>, TriageError> {
        Ok(self.repository.queue_info(item).await?)
    }

    pub async fn in_table(&self, table: Table, item: &ItemIdentity) -> Result<bool, TriageError> {
        Ok(self.repository.table_has_item(table, item).await?)
    }

    pub async fn is_queued(&self, item: &ItemIdentity) -> Result<bool, TriageError> {
        self.in_table(Table::Queue, item).await
    }

    /// Conversion service instance serving the item's namespace.
    pub async fn grin_instance(&self, item: &ItemIdentity) -> Result<String, TriageError> {
        let namespace = self
            .repository
            .namespace_info(&item.namespace)
            .await?
            .ok_or_else(|| TriageError::UnsupportedNamespace {
                item: item.to_string(),
                namespace: item.namespace.clone(),
            })?;

        namespace
            .grin_instance
            .ok_or_else(|| TriageError::NonGoogleIngest { item: item.to_string() })
    }

    pub async fn conversion_record(&self, item: &ItemIdentity) -> Result<Option<ConversionRecord>, TriageError> {
        let instance = self.grin_instance(item).await?;
        Ok(self.conversion.barcode_record(&instance, &item.object_id).await?)
    }

    pub async fn conversion_info(&self, item: &ItemIdentity) -> Result<ConversionInfo, TriageError> {
        self.conversion_record(item)
            .await?
            .map(|record| ConversionInfo::from(&record))
            .ok_or_else(|| TriageError::NotInConversionService { item: item.to_string() })
    }

    /// Whether the conversion service analyzed the item on or after the day `date`.
    ///
    /// GRIN analyzed dates are compared by day only.
    pub async fn analyzed_since(&self, item: &ItemIdentity, date: NaiveDate) -> Result<bool, TriageError> {
        let analyzed = self.conversion_info(item).await?.analyzed_date;
        debug!(item = %item, ?analyzed, since = %date, "Checked reanalysis");
        Ok(analyzed_on_or_after(analyzed, date))
    }

    pub async fn repository_zip_date(&self, item: &ItemIdentity) -> Result<Option<DateTime<Utc>>, TriageError> {
        Ok(self.archive.package_modified(item).await?)
    }

    pub async fn is_in_repository(&self, item: &ItemIdentity) -> Result<bool, TriageError> {
        Ok(self.repository_zip_date(item).await?.is_some())
    }

    pub async fn last_error(&self, item: &ItemIdentity) -> Result<Option<LastErrorRecord>, TriageError> {
        Ok(self.repository.last_error(item).await?)
    }

    /// Classify the most recent ingest error as "conversion failure" or "unknown".
    pub async fn last_error_classification(&self, item: &ItemIdentity) -> Result<&'static str, TriageError> {
        Ok(classify_last_error(self.last_error(item).await?.as_ref()))
    }

    pub async fn snapshot(&self, item: &ItemIdentity) -> Result<ItemState, TriageError> {
        let watch = self.watch_record(item).await?;

        let (grin_instance, conversion_info, conversion_error) = match self.grin_instance(item).await {
            Ok(instance) => match self.conversion.barcode_record(&instance, &item.object_id).await? {
                Some(record) => (Some(instance), Some(ConversionInfo::from(&record)), None),
                None => {
                    let missing = TriageError::NotInConversionService { item: item.to_string() };
                    (Some(instance), None, Some(missing.to_string()))
                }
            },
            Err(e) if e.escalates() => (None, None, Some(e.to_string())),
            Err(e) => return Err(e),
        };

        Ok(ItemState {
            item: item.to_string(),
            watched: watch.is_some(),
            ready: watch.as_ref().is_some_and(|record| record.ready),
            request_date: watch.and_then(|record| record.request_date),
            queue_info: self.queue_info(item).await?,
            grin_instance,
            conversion_info,
            conversion_error,
            repository_zip_date: self.repository_zip_date(item).await?,
            last_error: self.last_error(item).await?,
        })
    }
}

pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / 86_400.0
}

fn analyzed_on_or_after(analyzed: Option<NaiveDate>, date: NaiveDate) -> bool {
    analyzed.is_some_and(|analyzed| analyzed >= date)
}

pub fn classify_last_error(record: Option<&LastErrorRecord>) -> &'static str {
    let conversion_failure = record.is_some_and(|record| {
        record.detail.as_deref() == Some(CONVERSION_FAILURE_DETAIL)
            && record
                .message
                .as_deref()
                .is_some_and(|message| message.contains(CONVERSION_FAILURE_MESSAGE))
    });

    if conversion_failure {
        "conversion failure"
    } else {
        "unknown"
    }
}
