use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use leaveflow_chat::events::{ActionEvent, ChatEvent, CommandEvent, Sender, TextMessageEvent, Update};
use leaveflow_chat::messages::MessageTemplate;
use leaveflow_chat::transport::UpdateSource;
use leaveflow_chat::{
    bot_dispatcher, ChatId, ChatNotifier, LeaveBot, MessageRef, RecordingTransport,
    ReconnectPolicy, TransportError, UpdatePoller,
};
use leaveflow_core::approvals::{ApprovalEngine, ApprovalPolicy};
use leaveflow_core::audit::InMemoryAuditSink;
use leaveflow_core::domain::UserId;
use leaveflow_core::flows::ConversationService;
use leaveflow_core::ledger::{InMemoryLedger, LedgerAccount};
use leaveflow_core::store::{DraftStore, PendingRequests};
use rust_decimal::Decimal;

const REQUESTER: i64 = 42;
const SUPERVISORS: ChatId = ChatId(-100);
const OPERATIONS: ChatId = ChatId(-200);

struct OneShotSource {
    batches: Mutex<VecDeque<Vec<Update>>>,
}

#[async_trait]
impl UpdateSource for OneShotSource {
    async fn next_batch(&self, _offset: Option<i64>) -> Result<Option<Vec<Update>>, TransportError> {
        let next = match self.batches.lock() {
            Ok(mut batches) => batches.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Ok(next)
    }
}

struct Deployment {
    bot: LeaveBot,
    ledger: Arc<InMemoryLedger>,
    pending: Arc<PendingRequests>,
    audit: InMemoryAuditSink,
    transport: RecordingTransport,
    next_update: i64,
}

impl Deployment {
    fn new() -> Self {
        let transport = RecordingTransport::default();
        let ledger = Arc::new(InMemoryLedger::with_accounts(vec![LedgerAccount {
            user_id: UserId(REQUESTER),
            display_name: "Ana Lima".to_owned(),
            balance: Decimal::from(120),
        }]));
        let pending = Arc::new(PendingRequests::default());
        let audit = InMemoryAuditSink::default();
        let notifier = Arc::new(ChatNotifier::new(
            Arc::new(transport.clone()),
            SUPERVISORS,
            OPERATIONS,
        ));
        let conversations = Arc::new(ConversationService::new(
            Arc::new(DraftStore::default()),
            pending.clone(),
            notifier.clone(),
            Arc::new(audit.clone()),
        ));
        let approvals = Arc::new(ApprovalEngine::new(
            pending.clone(),
            ledger.clone(),
            notifier,
            Arc::new(audit.clone()),
            ApprovalPolicy::default(),
        ));
        let bot = LeaveBot::new(conversations, approvals, ledger.clone(), Arc::new(transport.clone()))
            .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap()));

        Self { bot, ledger, pending, audit, transport, next_update: 0 }
    }

    async fn deliver(&mut self, events: Vec<ChatEvent>) {
        let updates = events
            .into_iter()
            .map(|event| {
                self.next_update += 1;
                Update { update_id: self.next_update, event }
            })
            .collect();
        let source = Arc::new(OneShotSource { batches: Mutex::new(VecDeque::from([updates])) });
        let poller = UpdatePoller::new(
            source,
            Arc::new(self.transport.clone()),
            bot_dispatcher(self.bot.clone()),
            ReconnectPolicy {
                max_retries: Some(0),
                alert_after: 0,
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
        );
        poller.run().await.expect("poller drains the batch");
    }

    fn last_sent(&self, chat_id: ChatId) -> MessageTemplate {
        self.transport.sent_to(chat_id).pop().expect("message delivered")
    }
}

fn person(id: i64, name: &str) -> Sender {
    Sender { user_id: UserId(id), display_name: name.to_owned(), handle: None }
}

fn command(name: &str) -> ChatEvent {
    ChatEvent::Command(CommandEvent {
        chat_id: ChatId(REQUESTER),
        sender: person(REQUESTER, "Ana Lima"),
        command: name.to_owned(),
        args: String::new(),
    })
}

fn text(body: &str) -> ChatEvent {
    ChatEvent::Text(TextMessageEvent {
        chat_id: ChatId(REQUESTER),
        sender: person(REQUESTER, "Ana Lima"),
        text: body.to_owned(),
    })
}

fn press(message: &MessageTemplate, label: &str, chat_id: ChatId, approver: Sender) -> ChatEvent {
    let data = message
        .keyboard
        .as_ref()
        .and_then(|keyboard| keyboard.buttons().find(|button| button.text.contains(label)))
        .map(|button| button.callback_data.clone())
        .expect("button present");
    ChatEvent::Action(ActionEvent {
        action_id: format!("cb-{label}"),
        message: Some(MessageRef { chat_id, message_id: 1 }),
        sender: approver,
        data: Some(data),
    })
}

async fn submit_three_day_request(deployment: &mut Deployment) {
    deployment
        .deliver(vec![
            command("/request"),
            text("2025-02-15 to 2025-02-17"),
            text("8,4,8"),
            text("family visit"),
        ])
        .await;
}

#[tokio::test]
async fn request_travels_through_both_approval_stages() {
    let mut deployment = Deployment::new();
    submit_three_day_request(&mut deployment).await;

    let confirmation = deployment.last_sent(ChatId(REQUESTER));
    assert!(confirmation.text.contains("Total Hours: 20"));
    assert!(confirmation.text.contains("Request ID: REQ_20250210090000_42_1"));

    let supervisor_copy = deployment.last_sent(SUPERVISORS);
    assert!(supervisor_copy.text.contains("- Feb 16: 4 hours"));
    deployment
        .deliver(vec![press(&supervisor_copy, "Approve", SUPERVISORS, person(7, "Sam Supervisor"))])
        .await;

    let operations_copy = deployment.last_sent(OPERATIONS);
    assert!(operations_copy.text.contains("Approved by: Sam Supervisor"));
    deployment
        .deliver(vec![press(&operations_copy, "Approve", OPERATIONS, person(9, "Olga Ops"))])
        .await;

    assert_eq!(deployment.ledger.balance_of(UserId(REQUESTER)), Some(Decimal::from(100)));
    let history = deployment.ledger.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].breakdown_label(), "8,4,8");
    assert!(deployment.pending.is_empty().await);

    let approval = deployment.last_sent(ChatId(REQUESTER));
    assert!(approval.text.contains("fully approved"));
    assert!(approval.text.contains("Updated leave balance: 100 hours"));
    assert_eq!(deployment.transport.answered(), vec!["cb-Approve", "cb-Approve"]);

    let edits = deployment.transport.edits();
    assert_eq!(edits.len(), 2);
    assert!(edits[1].1.text.contains("Debited 20 hours, new balance 100 hours."));

    let audit = deployment.audit.event_types();
    assert!(audit.contains(&"conversation.submitted".to_owned()));
    assert!(audit.contains(&"approval.dutyops_approve".to_owned()));
}

#[tokio::test]
async fn supervisor_rejection_closes_the_request() {
    let mut deployment = Deployment::new();
    submit_three_day_request(&mut deployment).await;
    let supervisor_copy = deployment.last_sent(SUPERVISORS);

    deployment
        .deliver(vec![press(&supervisor_copy, "Reject", SUPERVISORS, person(7, "Sam Supervisor"))])
        .await;

    let rejection = deployment.last_sent(ChatId(REQUESTER));
    assert!(rejection.text.contains("rejected by Supervisor"));
    assert!(deployment.transport.sent_to(OPERATIONS).is_empty());

    // A stale button on the same copy no longer finds the request.
    deployment
        .deliver(vec![press(&supervisor_copy, "Approve", SUPERVISORS, person(7, "Sam Supervisor"))])
        .await;
    let edits = deployment.transport.edits();
    assert!(edits.last().expect("edit").1.text.contains("not found or already processed"));
    assert_eq!(deployment.ledger.balance_of(UserId(REQUESTER)), Some(Decimal::from(120)));
}

#[tokio::test]
async fn invalid_hours_reprompt_without_losing_progress() {
    let mut deployment = Deployment::new();

    deployment.deliver(vec![command("/request"), text("2025-02-15"), text("9")]).await;
    let reprompt = deployment.last_sent(ChatId(REQUESTER));
    assert!(reprompt.text.starts_with("❌"));
    assert!(reprompt.text.contains("for this day"));

    deployment.deliver(vec![text("4"), text("NIL")]).await;
    let confirmation = deployment.last_sent(ChatId(REQUESTER));
    assert!(confirmation.text.contains("Total Hours: 4"));
    assert_eq!(deployment.pending.len().await, 1);
}

#[tokio::test]
async fn cancel_discards_the_draft() {
    let mut deployment = Deployment::new();

    deployment.deliver(vec![command("/request"), text("2025-02-15"), command("/cancel")]).await;
    deployment.deliver(vec![text("8")]).await;

    let replies = deployment.transport.sent_to(ChatId(REQUESTER));
    assert_eq!(replies[replies.len() - 2].text, "Leave request cancelled.");
    assert!(replies[replies.len() - 1].text.contains("No leave request in progress"));
    assert!(deployment.transport.sent_to(SUPERVISORS).is_empty());
}

#[tokio::test]
async fn operations_rejection_after_supervisor_approval_leaves_balance_alone() {
    let mut deployment = Deployment::new();
    submit_three_day_request(&mut deployment).await;
    let supervisor_copy = deployment.last_sent(SUPERVISORS);
    deployment
        .deliver(vec![press(&supervisor_copy, "Approve", SUPERVISORS, person(7, "Sam Supervisor"))])
        .await;

    let operations_copy = deployment.last_sent(OPERATIONS);
    deployment
        .deliver(vec![press(&operations_copy, "Reject", OPERATIONS, person(9, "Olga Ops"))])
        .await;

    let rejection = deployment.last_sent(ChatId(REQUESTER));
    assert!(rejection.text.contains("rejected by Duty Ops"));
    assert!(deployment.pending.is_empty().await);
    assert_eq!(deployment.ledger.balance_of(UserId(REQUESTER)), Some(Decimal::from(120)));
    assert!(deployment.ledger.history().is_empty());
    assert!(deployment
        .transport
        .edits()
        .last()
        .expect("edit")
        .1
        .text
        .contains("Leave request rejected by Duty Ops."));

    deployment
        .deliver(vec![press(&operations_copy, "Approve", OPERATIONS, person(9, "Olga Ops"))])
        .await;
    let edits = deployment.transport.edits();
    assert!(edits.last().expect("edit").1.text.contains("not found or already processed"));
    assert_eq!(deployment.ledger.balance_of(UserId(REQUESTER)), Some(Decimal::from(120)));
}
