//! The leave bot: chat-facing glue between events and the core services.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leaveflow_core::approvals::{ActionPayload, ApprovalEngine, ApprovalError};
use leaveflow_core::balance::BalanceReport;
use leaveflow_core::errors::{ApplicationError, DomainError};
use leaveflow_core::flows::{ConversationReply, ConversationService};
use leaveflow_core::ledger::Ledger;
use tracing::{error, warn};

use crate::commands::{CommandRouteError, CommandService};
use crate::events::{
    ActionEvent, ActionService, CommandEvent, EventContext, EventHandlerError, TextMessageEvent,
    TextMessageService,
};
use crate::messages::{self, MessageTemplate};
use crate::transport::ChatTransport;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const RETRY_NOTICE: &str = "Could not process this action. Please try again.";

#[derive(Clone)]
pub struct LeaveBot {
    conversations: Arc<ConversationService>,
    approvals: Arc<ApprovalEngine>,
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn ChatTransport>,
    clock: Clock,
}

impl LeaveBot {
    pub fn new(
        conversations: Arc<ConversationService>,
        approvals: Arc<ApprovalEngine>,
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self { conversations, approvals, ledger, transport, clock: Arc::new(Utc::now) }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Outcome text for a button press, and whether the approver's message
    /// should be replaced. Retryable failures leave the buttons in place.
    async fn resolve_action(&self, event: &ActionEvent, ctx: &EventContext) -> ActionReply {
        let Some(payload) = event.data.as_deref().and_then(|data| data.parse::<ActionPayload>().ok())
        else {
            warn!(
                event_name = "approval.invalid_payload",
                correlation_id = %ctx.correlation_id,
                user_id = event.sender.user_id.0,
                data = event.data.as_deref().unwrap_or(""),
                "button press carried invalid callback data"
            );
            return ActionReply::Replace(messages::invalid_callback_message());
        };

        match self.approvals.apply(&payload, &event.sender.approver()).await {
            Ok(outcome) => ActionReply::Replace(messages::approver_outcome_message(&outcome)),
            Err(refusal @ ApprovalError::Ledger { .. }) => {
                let request_id = refusal.request_id().to_string();
                let failure =
                    ApplicationError::from(refusal).into_interface(ctx.correlation_id.clone());
                ActionReply::Retry(messages::failure_message(&failure, Some(&request_id)))
            }
            Err(refusal) if refusal.is_retryable() => {
                ActionReply::Retry(messages::approval_refused_message(&refusal))
            }
            Err(refusal) => ActionReply::Replace(messages::approval_refused_message(&refusal)),
        }
    }
}

enum ActionReply {
    Replace(MessageTemplate),
    Retry(MessageTemplate),
}

fn render_reply(reply: ConversationReply) -> MessageTemplate {
    match reply {
        ConversationReply::Prompt(prompt) => messages::prompt_message(prompt),
        ConversationReply::Invalid { error, retry } => messages::invalid_input_message(&error, retry),
        ConversationReply::Submitted(request) => messages::submitted_message(&request),
        ConversationReply::Cancelled => messages::cancelled_message(),
        ConversationReply::Idle => messages::idle_message(),
    }
}

#[async_trait]
impl CommandService for LeaveBot {
    async fn start(
        &self,
        event: &CommandEvent,
        _ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(messages::welcome_message(&event.sender.requester()))
    }

    async fn request(
        &self,
        event: &CommandEvent,
        _ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        // Drafts belong to the private chat; group answers would leak into them.
        if !event.is_private() {
            return Ok(messages::private_chat_required_message());
        }
        Ok(render_reply(self.conversations.begin(event.sender.user_id).await))
    }

    async fn balance(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let user_id = event.sender.user_id;
        match BalanceReport::load(self.ledger.as_ref(), user_id, self.now()).await {
            Ok(Some(report)) => Ok(messages::balance_report_message(&report)),
            Ok(None) => Ok(messages::balance_not_found_message()),
            Err(ledger_error) => {
                error!(
                    event_name = "balance.lookup_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = user_id.0,
                    error = %ledger_error,
                    "balance lookup failed"
                );
                let failure = ApplicationError::from(ledger_error)
                    .into_interface(ctx.correlation_id.clone());
                Ok(messages::failure_message(&failure, None))
            }
        }
    }

    async fn cancel(
        &self,
        event: &CommandEvent,
        _ctx: &EventContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(render_reply(self.conversations.cancel(event.sender.user_id).await))
    }
}

#[async_trait]
impl TextMessageService for LeaveBot {
    async fn handle_text_message(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        // Group chatter never advances a draft and gets no reply.
        if !event.is_private() {
            return Ok(None);
        }
        let requester = event.sender.requester();
        match self.conversations.handle_text(&requester, &event.text, self.now()).await {
            Ok(reply) => Ok(Some(render_reply(reply))),
            Err(store_error) => {
                error!(
                    event_name = "conversation.submit_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = requester.id.0,
                    error = %store_error,
                    "submission rejected by the request store"
                );
                let failure = ApplicationError::from(DomainError::from(store_error))
                    .into_interface(ctx.correlation_id.clone());
                Ok(Some(messages::failure_message(&failure, None)))
            }
        }
    }
}

#[async_trait]
impl ActionService for LeaveBot {
    async fn handle_action(
        &self,
        event: &ActionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let reply = self.resolve_action(event, ctx).await;
        let notice = match &reply {
            ActionReply::Replace(_) => None,
            ActionReply::Retry(_) => Some(RETRY_NOTICE),
        };

        let delivery = match (&reply, event.message) {
            (ActionReply::Replace(message), Some(target)) => {
                self.transport.edit_message(target, message).await
            }
            (ActionReply::Retry(message), Some(target)) => {
                self.transport.send_message(target.chat_id, message).await.map(|_| ())
            }
            (_, None) => Ok(()),
        };
        if let Err(transport_error) = delivery {
            warn!(
                event_name = "egress.action_reply_failed",
                correlation_id = %ctx.correlation_id,
                error = %transport_error,
                "failed to deliver action outcome"
            );
        }

        // Answered unconditionally so the client stops waiting.
        if let Err(transport_error) = self.transport.answer_action(&event.action_id, notice).await {
            warn!(
                event_name = "egress.action_answer_failed",
                correlation_id = %ctx.correlation_id,
                action_id = %event.action_id,
                error = %transport_error,
                "failed to answer button press"
            );
        }
        Ok(())
    }
}
