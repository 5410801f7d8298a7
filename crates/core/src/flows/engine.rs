use crate::flows::grammar::{parse_date_span, parse_hours, parse_remarks, ValidationError};
use crate::flows::states::{CompletedDraft, ConversationDraft, StepOutcome};

/// Pure transition function of the request conversation.
///
/// On a validation error the caller keeps the current draft untouched, which
/// is the self-loop of every collecting state.
pub fn advance(draft: &ConversationDraft, input: &str) -> Result<StepOutcome, ValidationError> {
    match draft {
        ConversationDraft::CollectingDates => {
            let span = parse_date_span(input)?;
            Ok(StepOutcome::Continue(ConversationDraft::CollectingHours { span }))
        }
        ConversationDraft::CollectingHours { span } => {
            let hours = parse_hours(span, input)?;
            Ok(StepOutcome::Continue(ConversationDraft::CollectingRemarks { span: *span, hours }))
        }
        ConversationDraft::CollectingRemarks { span, hours } => {
            let remarks = parse_remarks(input)?;
            Ok(StepOutcome::Complete(CompletedDraft { span: *span, hours: hours.clone(), remarks }))
        }
    }
}
