//! Error taxonomy for a ticket triage pass.

use thiserror::Error;

use crate::grin::GrinError;
use crate::repository::RepositoryError;
use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("Can't parse item reference '{reference}'")]
    MalformedReference { reference: String },

    #[error("{key} does not list any items")]
    NoItems { key: String },

    #[error("{item}: unknown namespace {namespace}")]
    UnsupportedNamespace { item: String, namespace: String },

    #[error("{item}: reingest is only supported for Google ingest")]
    NonGoogleIngest { item: String },

    #[error("{item}: not in GRIN")]
    NotInConversionService { item: String },

    #[error("{item} is already watched")]
    AlreadyWatched { item: String },

    #[error("{item} is blacklisted")]
    Blacklisted { item: String },

    #[error("{item} has no bib data in Zephir")]
    MissingBibliographicData { item: String },

    #[error("{item}: {message}")]
    InvariantViolation { item: String, message: String },

    #[error("{0}")]
    InconsistentState(String),

    #[error("Missing {field} request date")]
    MissingRequestDate { field: &'static str },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Conversion(#[from] GrinError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Archive lookup failed: {0}")]
    Archive(#[from] std::io::Error),
}

impl TriageError {
    /// Errors that the processor turns into a ticket comment plus an escalation.
    ///
    /// Transport failures are excluded: they abort the pass and are retried on the next run.
    pub fn escalates(&self) -> bool {
        matches!(
            self,
            TriageError::InvariantViolation { .. }
                | TriageError::InconsistentState(_)
                | TriageError::UnsupportedNamespace { .. }
                | TriageError::NonGoogleIngest { .. }
                | TriageError::NotInConversionService { .. }
                | TriageError::MissingRequestDate { .. }
        )
    }

    /// Registration precondition failures for a single item.
    pub fn is_registration_failure(&self) -> bool {
        matches!(
            self,
            TriageError::AlreadyWatched { .. }
                | TriageError::Blacklisted { .. }
                | TriageError::MissingBibliographicData { .. }
        )
    }
}
