use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::item::ItemIdentity;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("Unexpected value in {table}.{column}: {message}")]
    Decode {
        table: &'static str,
        column: &'static str,
        message: String,
    },
}

/// Lookup tables keyed by (namespace, id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Watched,
    Blacklist,
    Queue,
    NonReturned,
    RightsCurrent,
    LastError,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Watched => "feed_watched_items",
            Table::Blacklist => "feed_blacklist",
            Table::Queue => "feed_queue",
            Table::NonReturned => "feed_nonreturned",
            Table::RightsCurrent => "rights_current",
            Table::LastError => "feed_last_error",
        }
    }
}

/// Row in the tracking table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchRecord {
    pub issue_key: Option<String>,
    pub request_date: Option<DateTime<Utc>>,
    pub ready: bool,
}

/// Ingest queue status values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    InProcess,
    Rights,
    Collated,
    Punted,
    Done,
    Other(String),
}

impl QueueStatus {
    pub fn from_db(value: &str) -> Self {
        match value {
            "in_process" => QueueStatus::InProcess,
            "rights" => QueueStatus::Rights,
            "collated" => QueueStatus::Collated,
            "punted" => QueueStatus::Punted,
            "done" => QueueStatus::Done,
            other => QueueStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QueueStatus::InProcess => "in_process",
            QueueStatus::Rights => "rights",
            QueueStatus::Collated => "collated",
            QueueStatus::Punted => "punted",
            QueueStatus::Done => "done",
            QueueStatus::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    /// Whole days since the last queue update.
    pub age_days: i64,
    pub status: QueueStatus,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastErrorRecord {
    pub detail: Option<String>,
    pub message: Option<String>,
}

/// Namespace configuration row. `grin_instance` is `None` for non-Google namespaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceInfo {
    pub grin_instance: Option<String>,
}

/// Read/write access to the ingest database.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn watch_record(&self, item: &ItemIdentity) -> Result<Option<WatchRecord>, RepositoryError>;

    /// Insert a tracking record unless one already exists. Returns whether a row was inserted.
    async fn insert_watch(&self, item: &ItemIdentity, issue_key: &str) -> Result<bool, RepositoryError>;

    async fn queue_info(&self, item: &ItemIdentity) -> Result<Option<QueueInfo>, RepositoryError>;

    async fn last_error(&self, item: &ItemIdentity) -> Result<Option<LastErrorRecord>, RepositoryError>;

    async fn namespace_info(&self, namespace: &str) -> Result<Option<NamespaceInfo>, RepositoryError>;

    async fn table_has_item(&self, table: Table, item: &ItemIdentity) -> Result<bool, RepositoryError>;
}

/// MySQL-backed store over the feed tables.
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        info!("Connecting to ingest database");
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    async fn fetch_row(&self, table: Table, item: &ItemIdentity) -> Result<Option<MySqlRow>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE namespace = ? AND id = ?", table.name());
        let row = sqlx::query(&sql)
            .bind(&item.namespace)
            .bind(&item.object_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

fn utc(stamp: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(stamp, Utc)
}

#[async_trait]
impl RepositoryStore for MySqlRepository {
    async fn watch_record(&self, item: &ItemIdentity) -> Result<Option<WatchRecord>, RepositoryError> {
        let Some(row) = self.fetch_row(Table::Watched, item).await? else {
            return Ok(None);
        };

        let issue_key: Option<String> = row.try_get("issue_key")?;
        let request_date: Option<NaiveDateTime> = row.try_get("request_date")?;
        let ready: Option<bool> = row.try_get("ready")?;

        Ok(Some(WatchRecord {
            issue_key,
            request_date: request_date.map(utc),
            ready: ready.unwrap_or(false),
        }))
    }

    async fn insert_watch(&self, item: &ItemIdentity, issue_key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO feed_watched_items (namespace, id, issue_key, request_date)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(&item.namespace)
        .bind(&item.object_id)
        .bind(issue_key)
        .execute(&self.pool)
        .await?;

        debug!(item = %item, issue_key, rows = result.rows_affected(), "Inserted watch record");
        Ok(result.rows_affected() > 0)
    }

    async fn queue_info(&self, item: &ItemIdentity) -> Result<Option<QueueInfo>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT CAST(DATEDIFF(CURRENT_TIMESTAMP, q.update_stamp) AS SIGNED) AS age, q.status, q.update_stamp
            FROM feed_queue q
            WHERE q.namespace = ? AND q.id = ?
            "#,
        )
        .bind(&item.namespace)
        .bind(&item.object_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let age: Option<i64> = row.try_get("age")?;
        let status: String = row.try_get("status")?;
        let update_stamp: NaiveDateTime = row.try_get("update_stamp")?;

        Ok(Some(QueueInfo {
            age_days: age.ok_or(RepositoryError::Decode {
                table: "feed_queue",
                column: "update_stamp",
                message: "queue age is NULL".to_string(),
            })?,
            status: QueueStatus::from_db(&status),
            last_update: utc(update_stamp),
        }))
    }

    async fn last_error(&self, item: &ItemIdentity) -> Result<Option<LastErrorRecord>, RepositoryError> {
        let Some(row) = self.fetch_row(Table::LastError, item).await? else {
            return Ok(None);
        };

        Ok(Some(LastErrorRecord {
            detail: row.try_get("detail")?,
            message: row.try_get("message")?,
        }))
    }

    async fn namespace_info(&self, namespace: &str) -> Result<Option<NamespaceInfo>, RepositoryError> {
        let row = sqlx::query("SELECT grin_instance FROM ht_namespaces WHERE namespace = ?")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(NamespaceInfo {
                grin_instance: row.try_get("grin_instance")?,
            })),
            None => Ok(None),
        }
    }

    async fn table_has_item(&self, table: Table, item: &ItemIdentity) -> Result<bool, RepositoryError> {
        let sql = format!(
            "SELECT namespace, id FROM {} WHERE namespace = ? AND id = ? LIMIT 1",
            table.name()
        );
        let row = sqlx::query(&sql)
            .bind(&item.namespace)
            .bind(&item.object_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
