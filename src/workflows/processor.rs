use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::handlers::{Decision, HandlerContext, TicketHandler};
use super::state::WorkflowState;
use super::ticket::Ticket;
use crate::config::ThresholdConfig;
use crate::errors::TriageError;
use crate::item::{ItemStateAggregator, WatchRegistrar};
use crate::telemetry::ticket_span;
use crate::tracker::IssueTracker;

/// What one pass did to a ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// No update was made.
    Unchanged,
    Transitioned { from: String, to: WorkflowState },
    /// An internal error was reported on the ticket and it was escalated.
    Escalated { error: String },
}

pub struct TicketProcessor {
    aggregator: ItemStateAggregator,
    registrar: WatchRegistrar,
    tracker: Arc<dyn IssueTracker>,
    thresholds: ThresholdConfig,
    dry_run: bool,
    correlation_id: Option<String>,
}

impl TicketProcessor {
    pub fn new(aggregator: ItemStateAggregator, tracker: Arc<dyn IssueTracker>, thresholds: ThresholdConfig) -> Self {
        Self {
            registrar: WatchRegistrar::new(aggregator.clone()),
            aggregator,
            tracker,
            thresholds,
            dry_run: false,
            correlation_id: None,
        }
    }

    /// Decide and log without registering items or writing to the tracker.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub async fn process(&self, ticket: &Ticket) -> Result<ProcessOutcome, TriageError> {
        self.process_at(ticket, Utc::now()).await
    }

    /// Run one pass with `now` as the reference time for age thresholds.
    pub async fn process_at(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<ProcessOutcome, TriageError> {
        let span = ticket_span(
            &ticket.key,
            Some(ticket.workflow_state.as_str()),
            self.correlation_id.as_deref(),
        );
        self.run_pass(ticket, now).instrument(span).await
    }

    async fn run_pass(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<ProcessOutcome, TriageError> {
        let decided = match self.check_namespaces(ticket).await {
            Ok(()) => {
                self.watch_items(ticket).await?;
                self.decide(ticket, now).await
            }
            Err(e) => Err(e),
        };

        let (decision, escalation) = match decided {
            Ok(decision) => (decision, None),
            Err(e) if e.escalates() => {
                warn!(error = %e, "Escalating ticket after internal error");
                let decision = Decision {
                    next_state: WorkflowState::ESCALATION,
                    comment: escalation_comment(&e),
                };
                (Some(decision), Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let Some(decision) = decision else {
            info!("No transition this pass");
            return Ok(ProcessOutcome::Unchanged);
        };

        if escalation.is_none() && decision.next_state.label() == ticket.workflow_state {
            info!(state = %decision.next_state, "Ticket already in proposed state");
            return Ok(ProcessOutcome::Unchanged);
        }

        self.apply(ticket, &decision).await?;

        Ok(match escalation {
            Some(error) => ProcessOutcome::Escalated { error },
            None => ProcessOutcome::Transitioned {
                from: ticket.workflow_state.clone(),
                to: decision.next_state,
            },
        })
    }

    /// Every item must come from a namespace ingested through the conversion service.
    async fn check_namespaces(&self, ticket: &Ticket) -> Result<(), TriageError> {
        for item in &ticket.items {
            self.aggregator.grin_instance(item).await?;
        }
        Ok(())
    }

    async fn watch_items(&self, ticket: &Ticket) -> Result<(), TriageError> {
        for item in &ticket.items {
            if self.aggregator.is_watched(item).await? {
                continue;
            }
            if self.dry_run {
                info!(item = %item, "Dry run: would watch item");
                continue;
            }
            self.registrar.watch(item, &ticket.key).await?;
        }
        Ok(())
    }

    async fn decide(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<Option<Decision>, TriageError> {
        let handler = TicketHandler::for_ticket(ticket)?;
        let ctx = HandlerContext {
            aggregator: &self.aggregator,
            thresholds: &self.thresholds,
            ticket,
            now,
        };

        for item in &ticket.items {
            handler.check_item(&ctx, item).await?;
        }

        handler.next_state(&ctx, &ticket.items).await
    }

    async fn apply(&self, ticket: &Ticket, decision: &Decision) -> Result<(), TriageError> {
        let next = decision.next_state.label();
        if self.dry_run {
            info!(
                from = %ticket.workflow_state,
                to = next,
                comment = %decision.comment,
                "Dry run: would update ticket"
            );
            return Ok(());
        }

        self.tracker.set_workflow_state(&ticket.key, next).await?;
        if !decision.comment.is_empty() {
            self.tracker.add_comment(&ticket.key, &decision.comment).await?;
        }

        info!(from = %ticket.workflow_state, to = next, "Transitioned ticket");
        Ok(())
    }
}

/// A missing request date is reported as-is; anything else is flagged as unexpected.
fn escalation_comment(error: &TriageError) -> String {
    match error {
        TriageError::MissingRequestDate { .. } => error.to_string(),
        other => format!("Unexpected error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grin::client::MockConversionService;
    use crate::item::ItemIdentity;
    use crate::repository::archive::MockArchiveStore;
    use crate::repository::database::MockRepositoryStore;
    use crate::repository::{NamespaceInfo, Table, WatchRecord};
    use crate::tracker::client::MockIssueTracker;
    use mockall::predicate::eq;

    fn ticket(state: &str) -> Ticket {
        Ticket {
            key: "HTS-9999".to_string(),
            workflow_state: state.to_string(),
            items: vec![ItemIdentity::new("mdp", "39015002276304")],
            comments: Vec::new(),
            created: None,
            reanalyze_request_date: None,
            reprocess_request_date: None,
        }
    }

    fn google_repository() -> MockRepositoryStore {
        let mut repository = MockRepositoryStore::new();
        repository.expect_namespace_info().returning(|_| {
            Ok(Some(NamespaceInfo {
                grin_instance: Some("UOM".to_string()),
            }))
        });
        repository
    }

    fn watched_repository() -> MockRepositoryStore {
        let mut repository = google_repository();
        repository.expect_watch_record().returning(|_| {
            Ok(Some(WatchRecord {
                issue_key: Some("HTS-9999".to_string()),
                request_date: Some(Utc::now()),
                ready: false,
            }))
        });
        repository
    }

    fn processor(repository: MockRepositoryStore, tracker: MockIssueTracker) -> TicketProcessor {
        let aggregator = ItemStateAggregator::new(
            Arc::new(repository),
            Arc::new(MockConversionService::new()),
            Arc::new(MockArchiveStore::new()),
        );
        TicketProcessor::new(aggregator, Arc::new(tracker), ThresholdConfig::default())
    }

    #[tokio::test]
    async fn test_invariant_violation_escalates_with_comment() {
        let mut repository = watched_repository();
        repository.expect_table_has_item().returning(|_, _| Ok(false));

        let mut tracker = MockIssueTracker::new();
        tracker
            .expect_set_workflow_state()
            .with(eq("HTS-9999"), eq("UM to investigate further"))
            .times(1)
            .returning(|_, _| Ok(()));
        tracker
            .expect_add_comment()
            .with(
                eq("HTS-9999"),
                eq("Unexpected error: mdp.39015002276304: Next steps are HT to reingest but item is not in queue"),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = processor(repository, tracker).process(&ticket("HT to reingest")).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Escalated { .. }));
    }

    #[tokio::test]
    async fn test_missing_request_date_comment_is_bare() {
        let mut tracker = MockIssueTracker::new();
        tracker.expect_set_workflow_state().times(1).returning(|_, _| Ok(()));
        tracker
            .expect_add_comment()
            .with(eq("HTS-9999"), eq("Missing reanalyze request date"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = processor(watched_repository(), tracker)
            .process(&ticket("Google to reanalyze"))
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Escalated { .. }));
    }

    #[tokio::test]
    async fn test_registration_failure_propagates() {
        let mut repository = google_repository();
        repository.expect_watch_record().returning(|_| Ok(None));
        repository
            .expect_table_has_item()
            .returning(|table, _| Ok(table == Table::Blacklist));

        let mut tracker = MockIssueTracker::new();
        tracker.expect_set_workflow_state().never();
        tracker.expect_add_comment().never();

        let error = processor(repository, tracker)
            .process(&ticket("HT to queue"))
            .await
            .unwrap_err();
        assert!(matches!(error, TriageError::Blacklisted { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let mut repository = google_repository();
        repository.expect_watch_record().returning(|_| Ok(None));
        repository.expect_table_has_item().returning(|_, _| Ok(false));
        repository.expect_insert_watch().never();

        let mut tracker = MockIssueTracker::new();
        tracker.expect_set_workflow_state().never();
        tracker.expect_add_comment().never();

        let outcome = processor(repository, tracker)
            .with_dry_run(true)
            .process(&ticket("HT to reingest"))
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Escalated { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_namespace_escalates_before_registration() {
        let mut repository = MockRepositoryStore::new();
        repository.expect_namespace_info().returning(|_| Ok(None));
        repository.expect_watch_record().never();
        repository.expect_insert_watch().never();

        let mut tracker = MockIssueTracker::new();
        tracker
            .expect_set_workflow_state()
            .with(eq("HTS-9999"), eq("UM to investigate further"))
            .times(1)
            .returning(|_, _| Ok(()));
        tracker
            .expect_add_comment()
            .with(eq("HTS-9999"), eq("Unexpected error: mdp.39015002276304: unknown namespace mdp"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = processor(repository, tracker).process(&ticket("HT to queue")).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Escalated { .. }));
    }

    #[tokio::test]
    async fn test_default_handler_is_a_no_op() {
        let mut tracker = MockIssueTracker::new();
        tracker.expect_set_workflow_state().never();
        tracker.expect_add_comment().never();

        let outcome = processor(watched_repository(), tracker)
            .process(&ticket("UM to contact vendor"))
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Unchanged);
    }
}
