//! Two-stage approval of submitted leave requests.
//!
//! A request moves `supervisor → operations`. A rejection at either stage is
//! terminal, and so is operations approval, which also settles the requester's
//! balance in the ledger. Every action checks the request out of the
//! [`PendingRequests`] store, so actions on the same id are serialized and an
//! action on a settled id reports [`ApprovalError::NotFound`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::{Approver, RequestId, UserId};
use crate::ledger::{HistoryRecord, Ledger, LedgerError};
use crate::notify::Notifier;
use crate::store::PendingRequests;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStage {
    Supervisor,
    Operations,
}

impl ApprovalStage {
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Operations => "dutyops",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Supervisor => "Supervisor",
            Self::Operations => "Duty Ops",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Button payload `{stage}_{decision}_{request_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub stage: ApprovalStage,
    pub decision: Decision,
    pub request_id: RequestId,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("action payload `{0}` does not have the form stage_decision_request")]
    Shape(String),
    #[error("unknown approval stage `{0}`")]
    UnknownStage(String),
    #[error("unknown decision `{0}`")]
    UnknownDecision(String),
}

impl ActionPayload {
    pub fn new(stage: ApprovalStage, decision: Decision, request_id: RequestId) -> Self {
        Self { stage, decision, request_id }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.stage.payload_key(), self.decision.payload_key(), self.request_id)
    }
}

impl FromStr for ActionPayload {
    type Err = PayloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.splitn(3, '_');
        let (Some(stage), Some(decision), Some(request_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(PayloadError::Shape(raw.to_owned()));
        };
        if request_id.is_empty() {
            return Err(PayloadError::Shape(raw.to_owned()));
        }

        let stage = match stage {
            "supervisor" => ApprovalStage::Supervisor,
            "dutyops" => ApprovalStage::Operations,
            other => return Err(PayloadError::UnknownStage(other.to_owned())),
        };
        let decision = match decision {
            "approve" => Decision::Approve,
            "reject" => Decision::Reject,
            other => return Err(PayloadError::UnknownDecision(other.to_owned())),
        };

        Ok(Self { stage, decision, request_id: RequestId(request_id.to_owned()) })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Refuse operations-stage actions until a supervisor approved. Off by
    /// default, which lets operations act on a request directly.
    pub require_supervisor_approval: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    SupervisorApproved { request_id: RequestId },
    FullyApproved { request_id: RequestId, total_hours: Decimal, new_balance: Decimal },
    Rejected { request_id: RequestId, stage: ApprovalStage },
}

impl ApprovalOutcome {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::SupervisorApproved { request_id }
            | Self::FullyApproved { request_id, .. }
            | Self::Rejected { request_id, .. } => request_id,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("request `{request_id}` not found or already processed")]
    NotFound { request_id: RequestId },
    #[error("request `{request_id}` was already approved by supervisor {supervisor}")]
    AlreadySupervisorApproved { request_id: RequestId, supervisor: String },
    #[error("request `{request_id}` is still awaiting supervisor approval")]
    AwaitingSupervisor { request_id: RequestId },
    #[error("requester {requester} of `{request_id}` not found in balance ledger")]
    RequesterNotInLedger { request_id: RequestId, requester: UserId },
    #[error("ledger failure while settling `{request_id}`: {source}")]
    Ledger {
        request_id: RequestId,
        #[source]
        source: LedgerError,
    },
}

impl ApprovalError {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::NotFound { request_id }
            | Self::AlreadySupervisorApproved { request_id, .. }
            | Self::AwaitingSupervisor { request_id }
            | Self::RequesterNotInLedger { request_id, .. }
            | Self::Ledger { request_id, .. } => request_id,
        }
    }

    /// Whether the same action may succeed later; the request is still pending.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequesterNotInLedger { .. } | Self::Ledger { .. })
    }
}

pub struct ApprovalEngine {
    pending: Arc<PendingRequests>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    policy: ApprovalPolicy,
}

impl ApprovalEngine {
    pub fn new(
        pending: Arc<PendingRequests>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        policy: ApprovalPolicy,
    ) -> Self {
        Self { pending, ledger, notifier, audit, policy }
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    pub async fn apply(
        &self,
        action: &ActionPayload,
        actor: &Approver,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let result = match (action.stage, action.decision) {
            (ApprovalStage::Supervisor, Decision::Approve) => {
                self.supervisor_approve(&action.request_id, actor).await
            }
            (ApprovalStage::Operations, Decision::Approve) => {
                self.operations_approve(&action.request_id, actor).await
            }
            (stage, Decision::Reject) => self.reject(stage, &action.request_id, actor).await,
        };

        self.audit(action, actor, &result);
        result
    }

    async fn supervisor_approve(
        &self,
        request_id: &RequestId,
        actor: &Approver,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let mut entry = self.checkout(request_id).await?;
        if let Some(supervisor) = entry.request().supervisor_name() {
            return Err(ApprovalError::AlreadySupervisorApproved {
                request_id: request_id.clone(),
                supervisor: supervisor.to_owned(),
            });
        }

        entry.request_mut().supervisor_approval = Some(actor.clone());
        info!(
            event_name = "approval.supervisor_approved",
            request_id = %request_id,
            user_id = actor.id.0,
            "supervisor approved leave request"
        );
        self.notifier.escalated_to_operations(entry.request()).await;

        Ok(ApprovalOutcome::SupervisorApproved { request_id: request_id.clone() })
    }

    async fn operations_approve(
        &self,
        request_id: &RequestId,
        actor: &Approver,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let entry = self.checkout(request_id).await?;
        self.ensure_stage_order(entry.request())?;

        let request = entry.request();
        let ledger_error =
            |source: LedgerError| ApprovalError::Ledger { request_id: request_id.clone(), source };
        let total_hours = request.total_hours();

        let row = self
            .ledger
            .find_row_by_identity(request.requester.id)
            .await
            .map_err(ledger_error)?
            .ok_or_else(|| ApprovalError::RequesterNotInLedger {
                request_id: request_id.clone(),
                requester: request.requester.id,
            })?;
        let current_balance = self.ledger.read_balance(&row).await.map_err(ledger_error)?;
        let new_balance = current_balance - total_hours;

        self.ledger
            .settle(&row, new_balance, HistoryRecord::for_approval(request, actor))
            .await
            .map_err(ledger_error)?;
        info!(
            event_name = "approval.operations_approved",
            request_id = %request_id,
            user_id = actor.id.0,
            %total_hours,
            %current_balance,
            %new_balance,
            "leave request fully approved and ledger settled"
        );

        let request = entry.finish().await;
        self.notifier.request_approved(&request, actor, new_balance).await;

        Ok(ApprovalOutcome::FullyApproved {
            request_id: request_id.clone(),
            total_hours,
            new_balance,
        })
    }

    async fn reject(
        &self,
        stage: ApprovalStage,
        request_id: &RequestId,
        actor: &Approver,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let entry = self.checkout(request_id).await?;
        if stage == ApprovalStage::Operations {
            self.ensure_stage_order(entry.request())?;
        }

        let request = entry.finish().await;
        info!(
            event_name = "approval.rejected",
            request_id = %request_id,
            stage = stage.payload_key(),
            user_id = actor.id.0,
            "leave request rejected"
        );
        self.notifier.request_rejected(&request, stage).await;

        Ok(ApprovalOutcome::Rejected { request_id: request_id.clone(), stage })
    }

    async fn checkout(
        &self,
        request_id: &RequestId,
    ) -> Result<crate::store::PendingEntry<'_>, ApprovalError> {
        self.pending
            .checkout(request_id)
            .await
            .ok_or_else(|| ApprovalError::NotFound { request_id: request_id.clone() })
    }

    fn ensure_stage_order(
        &self,
        request: &crate::domain::LeaveRequest,
    ) -> Result<(), ApprovalError> {
        if self.policy.require_supervisor_approval && !request.is_supervisor_approved() {
            return Err(ApprovalError::AwaitingSupervisor { request_id: request.id.clone() });
        }
        Ok(())
    }

    fn audit(
        &self,
        action: &ActionPayload,
        actor: &Approver,
        result: &Result<ApprovalOutcome, ApprovalError>,
    ) {
        let event_type = format!(
            "approval.{}_{}",
            action.stage.payload_key(),
            action.decision.payload_key()
        );
        let event = match result {
            Ok(outcome) => {
                let event = AuditEvent::new(
                    Some(action.request_id.clone()),
                    event_type,
                    AuditCategory::Approval,
                    actor.display_name.clone(),
                    AuditOutcome::Success,
                );
                match outcome {
                    ApprovalOutcome::FullyApproved { total_hours, new_balance, .. } => event
                        .with_metadata("total_hours", total_hours.to_string())
                        .with_metadata("new_balance", new_balance.to_string()),
                    _ => event,
                }
            }
            Err(failure) => {
                let outcome = if failure.is_retryable() {
                    error!(
                        event_name = "approval.settlement_failed",
                        request_id = %action.request_id,
                        error = %failure,
                        "approval could not be settled; request stays pending"
                    );
                    AuditOutcome::Failed
                } else {
                    warn!(
                        event_name = "approval.refused",
                        request_id = %action.request_id,
                        error = %failure,
                        "approval action refused"
                    );
                    AuditOutcome::Rejected
                };
                AuditEvent::new(
                    Some(action.request_id.clone()),
                    event_type,
                    if matches!(failure, ApprovalError::Ledger { .. }) {
                        AuditCategory::Ledger
                    } else {
                        AuditCategory::Approval
                    },
                    actor.display_name.clone(),
                    outcome,
                )
                .with_metadata("error", failure.to_string())
            }
        };
        self.audit.emit(event);
    }
}
