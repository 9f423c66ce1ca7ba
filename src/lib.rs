// Reingest triage library - ticket triage for the digitization pipeline
// This exposes the core components for testing and integration

pub mod config;
pub mod errors;
pub mod grin;
pub mod item;
pub mod repository;
pub mod runner;
pub mod telemetry;
pub mod tracker;
pub mod workflows;

// Re-export key types for easy access
pub use config::{config, init_config, TriageConfig};
pub use errors::TriageError;
pub use grin::{ConversionService, GrinClient};
pub use item::{ItemIdentity, ItemState, ItemStateAggregator, WatchRegistrar};
pub use repository::{ArchiveStore, MySqlRepository, PairtreeArchive, RepositoryStore};
pub use runner::{BatchRunner, RunLock, RunSummary};
pub use telemetry::{generate_correlation_id, init_telemetry, ticket_span};
pub use tracker::{IssueTracker, JiraClient};
pub use workflows::{ProcessOutcome, Ticket, TicketHandler, TicketProcessor, WorkflowState};
