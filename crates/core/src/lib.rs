pub mod approvals;
pub mod audit;
pub mod balance;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ledger;
pub mod notify;
pub mod store;

pub use approvals::{
    ActionPayload, ApprovalEngine, ApprovalError, ApprovalOutcome, ApprovalPolicy, ApprovalStage,
    Decision, PayloadError,
};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use balance::BalanceReport;
pub use domain::{
    Approver, DateSpan, LeaveHours, LeaveRequest, RequestId, Requester, UserId, MAX_HOURS_PER_DAY,
    MAX_SPAN_DAYS,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConversationDraft, ConversationReply, ConversationService, Prompt, ValidationError};
pub use ledger::{HistoryRecord, InMemoryLedger, Ledger, LedgerAccount, LedgerError, LedgerRow};
pub use notify::{InMemoryNotifier, Notification, Notifier};
pub use store::{DraftStore, PendingRequests, RequestIdGenerator, StoreError};
