use tracing::info;

use super::aggregator::ItemStateAggregator;
use super::identity::ItemIdentity;
use crate::errors::TriageError;
use crate::repository::Table;

/// Tables whose presence shows the item has bibliographic data.
const BIB_EVIDENCE_TABLES: [Table; 3] = [Table::Queue, Table::NonReturned, Table::RightsCurrent];

/// One-time registration of items in the tracking table.
pub struct WatchRegistrar {
    aggregator: ItemStateAggregator,
}

impl WatchRegistrar {
    pub fn new(aggregator: ItemStateAggregator) -> Self {
        Self { aggregator }
    }

    /// Register `item` for tracking on behalf of `issue_key`.
    ///
    /// Preconditions are checked in order and the first failure wins. The
    /// insert itself is conditional, so a concurrent registration that slips
    /// past the first check still surfaces as `AlreadyWatched`.
    pub async fn watch(&self, item: &ItemIdentity, issue_key: &str) -> Result<(), TriageError> {
        self.aggregator.grin_instance(item).await?;

        if self.aggregator.is_watched(item).await? {
            return Err(TriageError::AlreadyWatched { item: item.to_string() });
        }

        if self.aggregator.in_table(Table::Blacklist, item).await? {
            return Err(TriageError::Blacklisted { item: item.to_string() });
        }

        let mut has_bib_data = false;
        for table in BIB_EVIDENCE_TABLES {
            if self.aggregator.in_table(table, item).await? {
                has_bib_data = true;
                break;
            }
        }
        if !has_bib_data {
            return Err(TriageError::MissingBibliographicData { item: item.to_string() });
        }

        if !self.aggregator.repository().insert_watch(item, issue_key).await? {
            return Err(TriageError::AlreadyWatched { item: item.to_string() });
        }

        info!(item = %item, issue_key, "Watching item");
        Ok(())
    }
}
