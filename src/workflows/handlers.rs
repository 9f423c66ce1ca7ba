//! Per-state ticket handlers.
//!
//! Each handler answers three questions about a ticket's items: does an
//! invariant hold (`check_item`), what should the comment say about an item
//! (`item_status`), and where should the ticket go next (`next_state`).

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use super::report::{format_date, ingest_status, why_stuck};
use super::state::WorkflowState;
use super::ticket::Ticket;
use crate::config::ThresholdConfig;
use crate::errors::TriageError;
use crate::item::{ItemIdentity, ItemStateAggregator};

/// Everything a handler consults while deciding.
pub struct HandlerContext<'a> {
    pub aggregator: &'a ItemStateAggregator,
    pub thresholds: &'a ThresholdConfig,
    pub ticket: &'a Ticket,
    pub now: DateTime<Utc>,
}

/// A proposed transition and the comment that explains it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub next_state: WorkflowState,
    /// Empty when the transition needs no explanation.
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TicketHandler {
    Reingest,
    Queue,
    /// `request_date` is the calendar day the reanalysis was requested.
    Reanalyze { request_date: NaiveDate },
    Reprocess,
    Rescan,
    /// No-op for terminal and unrecognized states
    Default,
}

impl TicketHandler {
    /// Handler for the ticket's current label, falling back to `Default`.
    pub fn for_ticket(ticket: &Ticket) -> Result<Self, TriageError> {
        match WorkflowState::from_label(&ticket.workflow_state) {
            Some(state) => Self::for_state(state, ticket),
            None => {
                warn!(
                    ticket.key = %ticket.key,
                    label = %ticket.workflow_state,
                    "Unrecognized workflow state label, using default handler"
                );
                Ok(TicketHandler::Default)
            }
        }
    }

    pub fn for_state(state: WorkflowState, ticket: &Ticket) -> Result<Self, TriageError> {
        Ok(match state {
            WorkflowState::HtToReingest => TicketHandler::Reingest,
            WorkflowState::HtToQueue => TicketHandler::Queue,
            WorkflowState::GoogleToReanalyze => TicketHandler::Reanalyze {
                request_date: ticket
                    .reanalyze_request_date
                    .ok_or(TriageError::MissingRequestDate { field: "reanalyze" })?,
            },
            WorkflowState::GoogleToReprocess => TicketHandler::Reprocess,
            WorkflowState::UmToScanEntireBook => TicketHandler::Rescan,
            WorkflowState::UmToInvestigateFurther => TicketHandler::Default,
        })
    }

    pub fn name(&self) -> &'static str {
        handler_name(match self {
            TicketHandler::Reingest => Some(WorkflowState::HtToReingest),
            TicketHandler::Queue => Some(WorkflowState::HtToQueue),
            TicketHandler::Reanalyze { .. } => Some(WorkflowState::GoogleToReanalyze),
            TicketHandler::Reprocess => Some(WorkflowState::GoogleToReprocess),
            TicketHandler::Rescan => Some(WorkflowState::UmToScanEntireBook),
            TicketHandler::Default => None,
        })
    }

    /// Enforce per-state invariants on one item.
    pub async fn check_item(&self, ctx: &HandlerContext<'_>, item: &ItemIdentity) -> Result<(), TriageError> {
        if *self == TicketHandler::Reingest && !ctx.aggregator.is_queued(item).await? {
            return Err(TriageError::InvariantViolation {
                item: item.to_string(),
                message: "Next steps are HT to reingest but item is not in queue".to_string(),
            });
        }
        Ok(())
    }

    pub async fn is_stuck(&self, ctx: &HandlerContext<'_>, item: &ItemIdentity) -> Result<bool, TriageError> {
        let thresholds = ctx.thresholds;
        let stuck = match self {
            TicketHandler::Reingest => {
                ctx.aggregator.is_queued(item).await?
                    && ctx
                        .aggregator
                        .queue_info(item)
                        .await?
                        .is_some_and(|queue| queue.age_days > thresholds.reingest_max_queue_age_days)
            }
            TicketHandler::Queue => {
                let waiting = !thresholds.queue_stuck_requires_unqueued || !ctx.aggregator.is_queued(item).await?;
                waiting
                    && ctx
                        .aggregator
                        .request_age_days(item, ctx.now)
                        .await?
                        .is_some_and(|age| age > thresholds.queue_max_wait_days as f64)
            }
            TicketHandler::Reanalyze { request_date } => {
                !ctx.aggregator.analyzed_since(item, *request_date).await?
                    && ctx
                        .ticket
                        .days_since_comment(ctx.now)
                        .is_some_and(|days| days > thresholds.reanalyze_max_wait_days as f64)
            }
            TicketHandler::Reprocess | TicketHandler::Rescan | TicketHandler::Default => false,
        };

        debug!(item = %item, handler = self.name(), stuck, "Evaluated stuck predicate");
        Ok(stuck)
    }

    async fn is_ready_or_stuck(&self, ctx: &HandlerContext<'_>, item: &ItemIdentity) -> Result<bool, TriageError> {
        Ok(ctx.aggregator.is_ready(item).await? || self.is_stuck(ctx, item).await?)
    }

    /// One comment line (two for an ingested item) describing the item.
    pub async fn item_status(&self, ctx: &HandlerContext<'_>, item: &ItemIdentity) -> Result<String, TriageError> {
        let aggregator = ctx.aggregator;

        if self.is_stuck(ctx, item).await? {
            return match self {
                TicketHandler::Reingest => {
                    let queue = aggregator.queue_info(item).await?.ok_or_else(|| {
                        TriageError::InconsistentState(format!("{item}: stuck in queue but has no queue entry"))
                    })?;
                    Ok(format!("{item}: {}", why_stuck(&queue)))
                }
                TicketHandler::Queue => Ok(format!("{item}: stuck - waiting to be queued")),
                _ => Ok(format!("{item}: stuck - waiting for reanalysis")),
            };
        }

        if aggregator.is_ready(item).await? {
            return ingest_status(aggregator, item).await;
        }

        match self {
            TicketHandler::Reingest => Err(TriageError::InconsistentState(format!(
                "{item}: item is neither ingested nor stuck"
            ))),
            TicketHandler::Queue => Ok(format!("{item}: waiting to be queued")),
            TicketHandler::Reanalyze { request_date } => {
                let analyzed = aggregator.conversion_info(item).await?.analyzed_date;
                match analyzed.filter(|date| date >= request_date) {
                    Some(date) => Ok(format!("{item}: reanalyzed {}", format_date(date))),
                    None => Ok(format!("{item}: still waiting for reanalysis")),
                }
            }
            TicketHandler::Reprocess | TicketHandler::Rescan | TicketHandler::Default => {
                Ok(format!("{item}: no automated checks in this state"))
            }
        }
    }

    async fn item_statuses(&self, ctx: &HandlerContext<'_>, items: &[ItemIdentity]) -> Result<String, TriageError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            lines.push(self.item_status(ctx, item).await?);
        }
        Ok(lines.join("\n"))
    }

    async fn all_queued(&self, ctx: &HandlerContext<'_>, items: &[ItemIdentity]) -> Result<bool, TriageError> {
        for item in items {
            if !ctx.aggregator.is_queued(item).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Proposed transition for the ticket, or `None` to leave it alone this pass.
    pub async fn next_state(
        &self,
        ctx: &HandlerContext<'_>,
        items: &[ItemIdentity],
    ) -> Result<Option<Decision>, TriageError> {
        if matches!(
            self,
            TicketHandler::Reprocess | TicketHandler::Rescan | TicketHandler::Default
        ) {
            return Ok(None);
        }

        let mut settled = true;
        for item in items {
            if !self.is_ready_or_stuck(ctx, item).await? {
                settled = false;
                break;
            }
        }
        if settled {
            return Ok(Some(Decision {
                next_state: WorkflowState::ESCALATION,
                comment: self.item_statuses(ctx, items).await?,
            }));
        }

        match self {
            TicketHandler::Queue => {
                if !self.all_queued(ctx, items).await? {
                    return Ok(None);
                }
                Ok(Some(Decision {
                    next_state: WorkflowState::HtToReingest,
                    comment: String::new(),
                }))
            }
            TicketHandler::Reanalyze { request_date } => {
                if self.all_queued(ctx, items).await? {
                    return Ok(Some(Decision {
                        next_state: WorkflowState::HtToReingest,
                        comment: String::new(),
                    }));
                }

                for item in items {
                    if !ctx.aggregator.analyzed_since(item, *request_date).await? {
                        return Ok(None);
                    }
                }
                Ok(Some(Decision {
                    next_state: WorkflowState::HtToQueue,
                    comment: self.item_statuses(ctx, items).await?,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Handler name for a known state; `None` stands for an unrecognized label.
pub fn handler_name(state: Option<WorkflowState>) -> &'static str {
    match state {
        Some(WorkflowState::HtToReingest) => "reingest",
        Some(WorkflowState::HtToQueue) => "queue",
        Some(WorkflowState::GoogleToReanalyze) => "reanalyze",
        Some(WorkflowState::GoogleToReprocess) => "reprocess",
        Some(WorkflowState::UmToScanEntireBook) => "rescan",
        Some(WorkflowState::UmToInvestigateFurther) | None => "default",
    }
}

/// Every known state paired with the handler it resolves to.
pub fn registry() -> Vec<(WorkflowState, &'static str)> {
    WorkflowState::ALL
        .into_iter()
        .map(|state| (state, handler_name(Some(state))))
        .collect()
}

/// Check that every known label resolves back to its own state.
pub fn validate_registry() -> Result<(), TriageError> {
    for state in WorkflowState::ALL {
        if WorkflowState::from_label(state.label()) != Some(state) {
            return Err(TriageError::InconsistentState(format!(
                "workflow state label '{}' does not resolve to {state:?}",
                state.label()
            )));
        }
    }
    Ok(())
}
