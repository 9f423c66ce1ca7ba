// Ticket triage: states, handlers, reports, and the per-ticket processor

pub mod handlers;
pub mod processor;
pub mod report;
pub mod state;
pub mod ticket;

pub use handlers::{registry, validate_registry, Decision, TicketHandler};
pub use processor::{ProcessOutcome, TicketProcessor};
pub use state::WorkflowState;
pub use ticket::Ticket;
