use std::sync::Arc;

use async_trait::async_trait;
use leaveflow_core::approvals::ApprovalStage;
use leaveflow_core::domain::{Approver, LeaveRequest};
use leaveflow_core::notify::Notifier;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::messages::{self, MessageTemplate};
use crate::transport::{ChatId, ChatTransport};

/// Delivers workflow notifications as chat messages. The requester is
/// addressed through their private chat, whose id equals their user id.
pub struct ChatNotifier {
    transport: Arc<dyn ChatTransport>,
    supervisor_chat: ChatId,
    operations_chat: ChatId,
}

impl ChatNotifier {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        supervisor_chat: ChatId,
        operations_chat: ChatId,
    ) -> Self {
        Self { transport, supervisor_chat, operations_chat }
    }

    async fn deliver(
        &self,
        notification: &'static str,
        request: &LeaveRequest,
        chat_id: ChatId,
        message: MessageTemplate,
    ) {
        match self.transport.send_message(chat_id, &message).await {
            Ok(_) => debug!(
                event_name = "notify.delivered",
                notification,
                request_id = %request.id,
                chat_id = chat_id.0,
                "notification delivered"
            ),
            Err(error) => warn!(
                event_name = "notify.failed",
                notification,
                request_id = %request.id,
                chat_id = chat_id.0,
                error = %error,
                "notification dispatch failed"
            ),
        }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn request_submitted(&self, request: &LeaveRequest) {
        let message = messages::supervisor_request_message(request);
        self.deliver("submitted", request, self.supervisor_chat, message).await;
    }

    async fn escalated_to_operations(&self, request: &LeaveRequest) {
        let message = messages::operations_request_message(request);
        self.deliver("escalated", request, self.operations_chat, message).await;
    }

    async fn request_approved(
        &self,
        request: &LeaveRequest,
        operations: &Approver,
        new_balance: Decimal,
    ) {
        let message =
            messages::requester_approved_message(request, &operations.display_name, new_balance);
        let requester_chat = ChatId(request.requester.id.0);
        self.deliver("approved", request, requester_chat, message).await;
    }

    async fn request_rejected(&self, request: &LeaveRequest, stage: ApprovalStage) {
        let message = messages::requester_rejected_message(request, stage);
        let requester_chat = ChatId(request.requester.id.0);
        self.deliver("rejected", request, requester_chat, message).await;
    }
}
