use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;

/// Conversion events reported per barcode, in lifecycle order.
pub const CONVERSION_EVENTS: [&str; 5] = ["Scanned", "Processed", "Analyzed", "Converted", "Downloaded"];

/// Raw field set returned by a barcode search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionRecord {
    fields: HashMap<String, String>,
}

impl ConversionRecord {
    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    /// Zip a tab-separated header row with the value row beneath it.
    ///
    /// Returns `None` when the response carries no value row.
    pub fn from_tsv(body: &str) -> Option<Self> {
        let mut lines = body.lines().filter(|line| !line.trim().is_empty());
        let headers: Vec<&str> = lines.next()?.split('\t').collect();
        let values: Vec<&str> = lines.next()?.split('\t').collect();

        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = values.get(i).copied().unwrap_or_default();
                (header.trim().to_string(), value.trim().to_string())
            })
            .collect();

        Some(Self { fields })
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Value of a field, or `None` when it is missing or blank.
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|value| !value.is_empty())
    }

    pub fn event_date(&self, event: &str) -> Option<NaiveDate> {
        self.non_empty(&format!("{event} Date")).and_then(parse_grin_date)
    }
}

/// Typed view of the fields the triage report uses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionInfo {
    pub scanned_date: Option<NaiveDate>,
    pub processed_date: Option<NaiveDate>,
    pub analyzed_date: Option<NaiveDate>,
    pub converted_date: Option<NaiveDate>,
    pub downloaded_date: Option<NaiveDate>,
    pub audit: Option<String>,
    pub rubbish: Option<String>,
    pub material_error_pct: String,
    pub overall_error_pct: String,
    pub state: Option<String>,
}

impl From<&ConversionRecord> for ConversionInfo {
    fn from(record: &ConversionRecord) -> Self {
        let owned = |field: &str| record.non_empty(field).map(str::to_string);
        Self {
            scanned_date: record.event_date("Scanned"),
            processed_date: record.event_date("Processed"),
            analyzed_date: record.event_date("Analyzed"),
            converted_date: record.event_date("Converted"),
            downloaded_date: record.event_date("Downloaded"),
            audit: owned("Audit"),
            rubbish: owned("Rubbish"),
            material_error_pct: record.get("Material Error%").unwrap_or_default().to_string(),
            overall_error_pct: record.get("Overall Error%").unwrap_or_default().to_string(),
            state: owned("State"),
        }
    }
}

impl ConversionInfo {
    /// Event dates paired with their names, in lifecycle order.
    pub fn event_dates(&self) -> [(&'static str, Option<NaiveDate>); 5] {
        [
            (CONVERSION_EVENTS[0], self.scanned_date),
            (CONVERSION_EVENTS[1], self.processed_date),
            (CONVERSION_EVENTS[2], self.analyzed_date),
            (CONVERSION_EVENTS[3], self.converted_date),
            (CONVERSION_EVENTS[4], self.downloaded_date),
        ]
    }
}

/// GRIN dates come back as `YYYY/MM/DD HH:MM` though other shapes have been seen.
pub fn parse_grin_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y/%m/%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|stamp| stamp.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        })
}
