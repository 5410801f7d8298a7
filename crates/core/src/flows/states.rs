use serde::{Deserialize, Serialize};

use crate::domain::{DateSpan, LeaveHours, LeaveRequest};
use crate::flows::grammar::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStep {
    CollectingDates,
    CollectingHours,
    CollectingRemarks,
}

/// Per-requester scratch state; each variant carries what earlier steps produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationDraft {
    #[default]
    CollectingDates,
    CollectingHours { span: DateSpan },
    CollectingRemarks { span: DateSpan, hours: LeaveHours },
}

impl ConversationDraft {
    pub fn step(&self) -> ConversationStep {
        match self {
            Self::CollectingDates => ConversationStep::CollectingDates,
            Self::CollectingHours { .. } => ConversationStep::CollectingHours,
            Self::CollectingRemarks { .. } => ConversationStep::CollectingRemarks,
        }
    }

    pub fn prompt(&self) -> Prompt {
        match self {
            Self::CollectingDates => Prompt::Dates,
            Self::CollectingHours { span } => Prompt::Hours { day_count: span.day_count() },
            Self::CollectingRemarks { .. } => Prompt::Remarks,
        }
    }
}

/// Everything a submission needs besides identity and clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedDraft {
    pub span: DateSpan,
    pub hours: LeaveHours,
    pub remarks: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue(ConversationDraft),
    Complete(CompletedDraft),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    Dates,
    Hours { day_count: usize },
    Remarks,
}

/// What the requester should see after one conversational turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationReply {
    Prompt(Prompt),
    Invalid { error: ValidationError, retry: Prompt },
    Submitted(LeaveRequest),
    Cancelled,
    /// Text arrived while no conversation was in progress.
    Idle,
}
