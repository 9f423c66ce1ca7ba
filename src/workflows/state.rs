use std::fmt;

/// Values of the ticket's "Next Steps" field known to triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    /// HathiTrust reingests the item from the conversion service
    HtToReingest,
    /// HathiTrust queues the item for ingest
    HtToQueue,
    /// Google reanalyzes the scan
    GoogleToReanalyze,
    /// Google reprocesses the scan
    GoogleToReprocess,
    /// The library rescans the whole volume
    UmToScanEntireBook,
    /// Escalated for a human; terminal for automation
    UmToInvestigateFurther,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::HtToReingest,
        WorkflowState::HtToQueue,
        WorkflowState::GoogleToReanalyze,
        WorkflowState::GoogleToReprocess,
        WorkflowState::UmToScanEntireBook,
        WorkflowState::UmToInvestigateFurther,
    ];

    /// Where every escalation lands
    pub const ESCALATION: WorkflowState = WorkflowState::UmToInvestigateFurther;

    pub fn label(self) -> &'static str {
        match self {
            WorkflowState::HtToReingest => "HT to reingest",
            WorkflowState::HtToQueue => "HT to queue",
            WorkflowState::GoogleToReanalyze => "Google to reanalyze",
            WorkflowState::GoogleToReprocess => "Google to re-process",
            WorkflowState::UmToScanEntireBook => "UM to scan entire book",
            WorkflowState::UmToInvestigateFurther => "UM to investigate further",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.label() == label.trim())
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
