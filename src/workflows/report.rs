//! Per-item status lines for ticket comments.

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::TriageError;
use crate::grin::ConversionInfo;
use crate::item::{ItemIdentity, ItemStateAggregator};
use crate::repository::{QueueInfo, QueueStatus};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(stamp: DateTime<Utc>) -> String {
    stamp.format(DATE_FORMAT).to_string()
}

/// `Scanned 2008-02-20; ...; never Downloaded`
pub fn format_conversion_dates(info: &ConversionInfo) -> String {
    info.event_dates()
        .iter()
        .map(|(event, date)| match date {
            Some(date) => format!("{event} {}", format_date(*date)),
            None => format!("never {event}"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn format_quality(info: &ConversionInfo) -> String {
    format!(
        "Audit: {}; Rubbish: {}; Material Error: {}; Overall Error: {}",
        info.audit.as_deref().unwrap_or("(not audited)"),
        info.rubbish.as_deref().unwrap_or("(not evaluated)"),
        info.material_error_pct,
        info.overall_error_pct,
    )
}

/// Human-readable reason an item is held in the ingest queue.
pub fn why_stuck(queue: &QueueInfo) -> String {
    let reason = match &queue.status {
        QueueStatus::InProcess => "in process",
        QueueStatus::Rights | QueueStatus::Collated => "waiting for rights",
        other => other.as_str(),
    };
    format!("stuck - {reason} since {}", format_timestamp(queue.last_update))
}

/// Outcome line for an item whose tracking record reports it ready.
pub async fn ingest_status(aggregator: &ItemStateAggregator, item: &ItemIdentity) -> Result<String, TriageError> {
    let status = aggregator.queue_info(item).await?.map(|queue| queue.status);

    match status {
        Some(QueueStatus::Done) => {
            let info = aggregator.conversion_info(item).await?;
            let ingested = match aggregator.repository_zip_date(item).await? {
                Some(stamp) => format!("Ingested {}", format_timestamp(stamp)),
                None => "not found in repository".to_string(),
            };
            Ok(format!(
                "{item}: {}; {ingested}\n{item}: {}",
                format_conversion_dates(&info),
                format_quality(&info)
            ))
        }
        Some(QueueStatus::Punted) => {
            let classification = aggregator.last_error_classification(item).await?;
            Ok(format!("{item}: failed ingest ({classification})"))
        }
        other => Err(TriageError::InconsistentState(format!(
            "{item}: item is ready but not done or punted (queue status {})",
            other.as_ref().map_or("absent", QueueStatus::as_str)
        ))),
    }
}
