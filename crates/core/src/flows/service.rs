use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::{LeaveRequest, Requester, UserId};
use crate::flows::engine::advance;
use crate::flows::states::{CompletedDraft, ConversationReply, Prompt, StepOutcome};
use crate::notify::Notifier;
use crate::store::{DraftStore, PendingRequests, RequestIdGenerator, StoreError};

/// Drives requesters through the request conversation and submits completed
/// drafts to the pending set.
pub struct ConversationService {
    drafts: Arc<DraftStore>,
    pending: Arc<PendingRequests>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    ids: RequestIdGenerator,
}

impl ConversationService {
    pub fn new(
        drafts: Arc<DraftStore>,
        pending: Arc<PendingRequests>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { drafts, pending, notifier, audit, ids: RequestIdGenerator::default() }
    }

    /// Enters the conversation, resetting a draft already in progress.
    pub async fn begin(&self, requester: UserId) -> ConversationReply {
        let replaced = self.drafts.begin(requester).await;
        debug!(
            event_name = "conversation.started",
            user_id = requester.0,
            replaced_existing = replaced,
            "request conversation started"
        );
        ConversationReply::Prompt(Prompt::Dates)
    }

    pub async fn is_active(&self, requester: UserId) -> bool {
        self.drafts.get(requester).await.is_some()
    }

    /// Feeds one free-text message into the requester's draft.
    ///
    /// Validation failures keep the draft where it was and ask again. The
    /// only error is a request id collision in the pending set, in which case
    /// the draft is kept so the requester can resend the remarks.
    pub async fn handle_text(
        &self,
        requester: &Requester,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationReply, StoreError> {
        let Some(draft) = self.drafts.get(requester.id).await else {
            return Ok(ConversationReply::Idle);
        };

        match advance(&draft, text) {
            Err(error) => {
                debug!(
                    event_name = "conversation.invalid_input",
                    user_id = requester.id.0,
                    step = ?draft.step(),
                    error = %error,
                    "conversation input rejected"
                );
                Ok(ConversationReply::Invalid { error, retry: draft.prompt() })
            }
            Ok(StepOutcome::Continue(next)) => {
                let prompt = next.prompt();
                if !self.drafts.update(requester.id, next).await {
                    return Ok(ConversationReply::Idle);
                }
                Ok(ConversationReply::Prompt(prompt))
            }
            Ok(StepOutcome::Complete(completed)) => {
                let request = self.submit(requester, completed, now).await?;
                Ok(ConversationReply::Submitted(request))
            }
        }
    }

    /// Drops the draft if there is one. Always acknowledged.
    pub async fn cancel(&self, requester: UserId) -> ConversationReply {
        if let Some(draft) = self.drafts.discard(requester).await {
            info!(
                event_name = "conversation.cancelled",
                user_id = requester.0,
                step = ?draft.step(),
                "request conversation cancelled"
            );
            self.audit.emit(AuditEvent::new(
                None,
                "conversation.cancelled",
                AuditCategory::Conversation,
                requester.to_string(),
                AuditOutcome::Success,
            ));
        }
        ConversationReply::Cancelled
    }

    async fn submit(
        &self,
        requester: &Requester,
        completed: CompletedDraft,
        now: DateTime<Utc>,
    ) -> Result<LeaveRequest, StoreError> {
        let request = LeaveRequest {
            id: self.ids.next(requester.id, now),
            requester: requester.clone(),
            span: completed.span,
            hours: completed.hours,
            remarks: completed.remarks,
            submitted_at: now,
            supervisor_approval: None,
        };

        self.pending.insert(request.clone()).await?;
        self.drafts.discard(requester.id).await;
        info!(
            event_name = "conversation.submitted",
            request_id = %request.id,
            user_id = requester.id.0,
            days = request.span.day_count(),
            total_hours = %request.total_hours(),
            "leave request submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                "conversation.submitted",
                AuditCategory::Conversation,
                requester.display_name.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("span", request.span.to_string())
            .with_metadata("total_hours", request.total_hours().to_string()),
        );

        self.notifier.request_submitted(&request).await;
        Ok(request)
    }
}
