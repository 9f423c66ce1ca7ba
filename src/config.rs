use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for reingest triage
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Issue tracker connection
    pub jira: JiraConfig,
    /// Conversion service connection
    pub grin: GrinConfig,
    /// Ingest database connection
    pub database: DatabaseConfig,
    /// Archival repository layout
    pub repository: RepositoryConfig,
    /// Stuck detection thresholds
    pub thresholds: ThresholdConfig,
    /// Batch run settings
    pub runner: RunnerConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JiraConfig {
    /// REST API root, e.g. https://jira.example.org/rest/api/2/
    pub base_url: String,
    pub username: String,
    /// Password (can be set via env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Page size for searches
    pub max_results: u32,
    /// Custom field ids
    pub fields: JiraFields,
}

/// Jira custom field ids for the ticket fields triage reads and writes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JiraFields {
    /// Free-text list of item references
    pub items: String,
    /// "Next Steps" select list
    pub workflow_state: String,
    pub reanalyze_request_date: String,
    pub reprocess_request_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrinConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// MySQL connection string
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Root of the per-namespace pairtrees
    pub obj_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Days an item may sit in the ingest queue before it counts as stuck
    pub reingest_max_queue_age_days: i64,
    /// Days since registration before an unqueued item counts as stuck
    pub queue_max_wait_days: i64,
    /// Days since the last ticket comment before a pending reanalysis counts as stuck
    pub reanalyze_max_wait_days: i64,
    /// When false, a queued item can still be stuck once the wait threshold passes
    pub queue_stuck_requires_unqueued: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Saved search used by `search` when no JQL is given
    pub default_jql: String,
    /// Lock file guarding against overlapping runs
    pub lock_file: PathBuf,
    /// Compute decisions without writing anything
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive; RUST_LOG takes precedence
    pub log_level: String,
    /// JSON output (false gives compact human-readable lines)
    pub json: bool,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wush.net/jira/hathitrust/rest/api/2/".to_string(),
            username: String::new(),
            password: None, // Will be read from env var or .env
            max_results: 1000,
            fields: JiraFields::default(),
        }
    }
}

impl Default for JiraFields {
    fn default() -> Self {
        Self {
            items: "customfield_10040".to_string(),
            workflow_state: "customfield_10020".to_string(),
            reanalyze_request_date: "customfield_10071".to_string(),
            reprocess_request_date: "customfield_10070".to_string(),
        }
    }
}

impl Default for GrinConfig {
    fn default() -> Self {
        Self {
            base_url: "https://books.google.com/libraries".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mysql://localhost/ht".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            obj_root: PathBuf::from("/sdr1/obj"),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            reingest_max_queue_age_days: 7,
            queue_max_wait_days: 14,
            reanalyze_max_wait_days: 7,
            queue_stuck_requires_unqueued: true,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_jql: r#""Next Steps" in ("HT to reingest", "HT to queue", "Google to reanalyze") AND (labels IS NULL OR labels != "automation_ignore")"#.to_string(),
            lock_file: PathBuf::from("/tmp/reingest-triage.lock"),
            dry_run: false,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl TriageConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. reingest-triage.toml in the working directory
    /// 3. The file named by REINGEST_TRIAGE_CONFIG
    /// 4. Environment variables (prefixed with REINGEST_TRIAGE_, `__` between sections)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("reingest-triage.toml").exists() {
            builder = builder.add_source(File::with_name("reingest-triage"));
        }

        if let Ok(path) = std::env::var("REINGEST_TRIAGE_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }

        builder = builder.add_source(
            Environment::with_prefix("REINGEST_TRIAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let triage_config: TriageConfig = builder.build()?.try_deserialize()?;
        triage_config.validate()?;
        Ok(triage_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jira.base_url.trim().is_empty() {
            bail!("jira.base_url must not be empty");
        }
        if self.database.url.trim().is_empty() {
            bail!("database.url must not be empty");
        }

        let thresholds = [
            ("reingest_max_queue_age_days", self.thresholds.reingest_max_queue_age_days),
            ("queue_max_wait_days", self.thresholds.queue_max_wait_days),
            ("reanalyze_max_wait_days", self.thresholds.reanalyze_max_wait_days),
        ];
        for (name, days) in thresholds {
            if days <= 0 {
                bail!("thresholds.{name} must be positive, got {days}");
            }
        }

        Ok(())
    }

    /// Effective configuration as TOML, with the password left out
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.jira.password = None;
        Ok(toml::to_string_pretty(&redacted)?)
    }

    /// Load .env file if it exists, returning whether one was loaded
    pub fn load_env_file() -> Result<bool> {
        if !Path::new(".env").exists() {
            return Ok(false);
        }
        dotenvy::dotenv()?;
        Ok(true)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LoadedConfig, anyhow::Error>> = std::sync::LazyLock::new(|| {
    // Load .env file first
    let env_file = TriageConfig::load_env_file().unwrap_or(false);
    Ok(LoadedConfig {
        config: TriageConfig::load()?,
        env_file,
    })
});

struct LoadedConfig {
    config: TriageConfig,
    env_file: bool,
}

/// Get the global configuration
pub fn config() -> Result<&'static TriageConfig> {
    loaded().map(|loaded| &loaded.config)
}

/// Whether the global configuration picked up a .env file
pub fn env_file_loaded() -> bool {
    loaded().is_ok_and(|loaded| loaded.env_file)
}

fn loaded() -> Result<&'static LoadedConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup, before logging is installed)
pub fn init_config() -> Result<&'static TriageConfig> {
    config()
}
