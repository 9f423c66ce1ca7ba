use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging
///
/// Logs go to stderr. `RUST_LOG` overrides the configured level when set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!("Telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the tickets of one run
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one processing pass over a ticket
pub fn ticket_span(key: &str, workflow_state: Option<&str>, correlation_id: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "ticket_pass",
        ticket.key = key,
        workflow.state = workflow_state,
        correlation.id = correlation_id,
    )
}
