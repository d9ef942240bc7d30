use crate::database::record_store::RecordStatus;
use chrono::{DateTime, Utc};

/// Reconciliation loop state. `Success`, `Failed` and `TimedOut` are
/// terminal: the poll timer stops permanently and no further reads or writes
/// happen from that loop instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Initiated,
    Polling,
    Success,
    Failed,
    TimedOut,
}

impl ReconcileState {
    pub fn valid_transitions(&self) -> Vec<ReconcileState> {
        match self {
            ReconcileState::Initiated => vec![ReconcileState::Polling],
            ReconcileState::Polling => vec![
                ReconcileState::Success,
                ReconcileState::Failed,
                ReconcileState::TimedOut,
            ],
            ReconcileState::Success | ReconcileState::Failed | ReconcileState::TimedOut => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcileState::Success | ReconcileState::Failed | ReconcileState::TimedOut
        )
    }
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReconcileState::Initiated => "initiated",
            ReconcileState::Polling => "polling",
            ReconcileState::Success => "success",
            ReconcileState::Failed => "failed",
            ReconcileState::TimedOut => "timed_out",
        };
        write!(f, "{}", label)
    }
}

/// Terminal result of one reconciliation loop instance.
///
/// `TimedOut` is deliberately distinct from `Failed`: money may have moved
/// even though confirmation did not arrive inside the interactive window, so
/// the user messaging is "we couldn't confirm, contact support if you were
/// charged", never "payment declined".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success { transaction_id: Option<String> },
    Failed { reason: Option<String> },
    TimedOut,
}

impl ReconcileOutcome {
    pub fn state(&self) -> ReconcileState {
        match self {
            ReconcileOutcome::Success { .. } => ReconcileState::Success,
            ReconcileOutcome::Failed { .. } => ReconcileState::Failed,
            ReconcileOutcome::TimedOut => ReconcileState::TimedOut,
        }
    }
}

/// Ephemeral per-loop bookkeeping. One instance per active loop; created when
/// the user is redirected to the gateway, gone once a terminal state is
/// reached or the attempt budget runs out.
#[derive(Debug, Clone)]
pub struct ReconciliationAttempt {
    pub reference: String,
    pub attempt_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_status: Option<RecordStatus>,
}

impl ReconciliationAttempt {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            attempt_count: 0,
            started_at: Utc::now(),
            last_status: None,
        }
    }
}
