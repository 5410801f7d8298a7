use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::approvals::ApprovalStage;
use crate::domain::{Approver, LeaveRequest, RequestId};

/// Outward-facing messages of the workflow.
///
/// Delivery is best effort: implementations log and swallow dispatch
/// failures, so a notification never blocks or reverses a state change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_submitted(&self, request: &LeaveRequest);

    async fn escalated_to_operations(&self, request: &LeaveRequest);

    async fn request_approved(
        &self,
        request: &LeaveRequest,
        operations: &Approver,
        new_balance: Decimal,
    );

    async fn request_rejected(&self, request: &LeaveRequest, stage: ApprovalStage);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Submitted { request_id: RequestId },
    Escalated { request_id: RequestId, supervisor: Option<String> },
    Approved { request_id: RequestId, operations: String, new_balance: Decimal },
    Rejected { request_id: RequestId, stage: ApprovalStage },
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn request_submitted(&self, request: &LeaveRequest) {
        self.record(Notification::Submitted { request_id: request.id.clone() });
    }

    async fn escalated_to_operations(&self, request: &LeaveRequest) {
        self.record(Notification::Escalated {
            request_id: request.id.clone(),
            supervisor: request.supervisor_name().map(str::to_owned),
        });
    }

    async fn request_approved(
        &self,
        request: &LeaveRequest,
        operations: &Approver,
        new_balance: Decimal,
    ) {
        self.record(Notification::Approved {
            request_id: request.id.clone(),
            operations: operations.display_name.clone(),
            new_balance,
        });
    }

    async fn request_rejected(&self, request: &LeaveRequest, stage: ApprovalStage) {
        self.record(Notification::Rejected { request_id: request.id.clone(), stage });
    }
}
