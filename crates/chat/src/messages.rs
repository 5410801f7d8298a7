//! Plain-text message templates with optional inline keyboards.

use leaveflow_core::approvals::{
    ActionPayload, ApprovalError, ApprovalOutcome, ApprovalStage, Decision,
};
use leaveflow_core::balance::BalanceReport;
use leaveflow_core::domain::{LeaveRequest, Requester, MAX_SPAN_DAYS};
use leaveflow_core::errors::InterfaceError;
use leaveflow_core::flows::{Prompt, ValidationError};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { text: text.into(), callback_data: callback_data.into() }
    }
}

/// Serializes as Telegram's `InlineKeyboardMarkup`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.inline_keyboard.iter().flatten()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplate {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl MessageTemplate {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }
}

pub struct MessageBuilder {
    lines: Vec<String>,
    keyboard: Option<InlineKeyboard>,
}

impl MessageBuilder {
    pub fn new(first_line: impl Into<String>) -> Self {
        Self { lines: vec![first_line.into()], keyboard: None }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines<I>(mut self, lines: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn blank(self) -> Self {
        self.line("")
    }

    pub fn button_row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut row = RowBuilder::default();
        build(&mut row);
        self.keyboard.get_or_insert_with(InlineKeyboard::default).inline_keyboard.push(row.buttons);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { text: self.lines.join("\n"), keyboard: self.keyboard }
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<InlineButton>,
}

impl RowBuilder {
    pub fn button(&mut self, button: InlineButton) -> &mut Self {
        self.buttons.push(button);
        self
    }
}

fn hours_lines(request: &LeaveRequest) -> Vec<String> {
    request
        .hours
        .iter()
        .map(|(date, hours)| format!("- {}: {} hours", date.format("%b %d"), hours.normalize()))
        .collect()
}

fn requester_line(requester: &Requester) -> String {
    format!("From: {} ({})", requester.display_name, requester.handle_label())
}

fn decision_row(stage: ApprovalStage, request: &LeaveRequest) -> impl FnOnce(&mut RowBuilder) {
    let approve = ActionPayload::new(stage, Decision::Approve, request.id.clone()).encode();
    let reject = ActionPayload::new(stage, Decision::Reject, request.id.clone()).encode();
    move |row| {
        row.button(InlineButton::new("✅ Approve", approve))
            .button(InlineButton::new("❌ Reject", reject));
    }
}

pub fn welcome_message(requester: &Requester) -> MessageTemplate {
    let handle = requester.handle.as_deref().filter(|handle| !handle.trim().is_empty());
    MessageBuilder::new("Welcome to the Leave Request Bot!")
        .blank()
        .line(format!("Your Telegram ID: {}", requester.id))
        .line(format!("Your Display Name: {}", requester.display_name))
        .line(format!("Your Username: @{}", handle.unwrap_or("not set")))
        .blank()
        .line("Available commands:")
        .line("/request - Start a new leave request")
        .line("/balance - Check your leave balance")
        .line("/cancel - Cancel current leave request")
        .build()
}

pub fn prompt_message(prompt: Prompt) -> MessageTemplate {
    match prompt {
        Prompt::Dates => MessageBuilder::new("Please enter the date(s) for your leave:")
            .line("Format: YYYY-MM-DD or YYYY-MM-DD to YYYY-MM-DD")
            .line("Example: 2025-02-15 or 2025-02-15 to 2025-02-17")
            .line(format!("A single request covers at most {MAX_SPAN_DAYS} days."))
            .build(),
        Prompt::Hours { day_count: 1 } => {
            MessageBuilder::new("Please enter the hours for this day:")
                .line("Examples:")
                .line("- Full day: 8")
                .line("- Half day: 4")
                .build()
        }
        Prompt::Hours { day_count } => {
            MessageBuilder::new(format!("Please enter the hours for each day ({day_count} days):"))
                .line("Options:")
                .line(format!(
                    "1. Same hours each day: enter a single number (e.g., 8 for {day_count} full days)"
                ))
                .line("2. Different hours: enter one value per day separated by commas (e.g., 8,4)")
                .blank()
                .line("Each value must be greater than 0 and at most 8.")
                .build()
        }
        Prompt::Remarks => MessageBuilder::new("Please enter any remarks for your leave request.")
            .line("Enter NIL if there is nothing to add.")
            .build(),
    }
}

pub fn invalid_input_message(error: &ValidationError, retry: Prompt) -> MessageTemplate {
    let prompt = prompt_message(retry);
    MessageBuilder::new(format!("❌ {error}")).blank().line(prompt.text).build()
}

pub fn submitted_message(request: &LeaveRequest) -> MessageTemplate {
    MessageBuilder::new("Your leave request has been submitted:")
        .line(format!("Dates: {}", request.span))
        .line("Hours:")
        .lines(hours_lines(request))
        .line(format!("Total Hours: {}", request.total_hours().normalize()))
        .line(format!("Remarks: {}", request.remarks))
        .line(format!("Request ID: {}", request.id))
        .blank()
        .line("Your supervisor has been notified.")
        .build()
}

pub fn cancelled_message() -> MessageTemplate {
    MessageTemplate::plain("Leave request cancelled.")
}

pub fn private_chat_required_message() -> MessageTemplate {
    MessageTemplate::plain("Please send /request to me in a private chat to file a leave request.")
}

pub fn idle_message() -> MessageTemplate {
    MessageTemplate::plain("No leave request in progress. Use /request to start one.")
}

pub fn unknown_command_message(command: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Unknown command `{command}`."))
        .line("Available commands: /request, /balance, /cancel")
        .build()
}

pub fn supervisor_request_message(request: &LeaveRequest) -> MessageTemplate {
    MessageBuilder::new("🔔 New Leave Request")
        .blank()
        .line(requester_line(&request.requester))
        .line(format!("Dates: {}", request.span))
        .line("Hours:")
        .lines(hours_lines(request))
        .line(format!("Total Hours: {}", request.total_hours().normalize()))
        .line(format!("Remarks: {}", request.remarks))
        .line(format!("Time: {}", request.submitted_at.format("%Y-%m-%d %H:%M:%S")))
        .button_row(decision_row(ApprovalStage::Supervisor, request))
        .build()
}

pub fn operations_request_message(request: &LeaveRequest) -> MessageTemplate {
    MessageBuilder::new("🔔 Leave Request for Final Approval")
        .blank()
        .line(requester_line(&request.requester))
        .line(format!("Dates: {}", request.span))
        .line("Hours:")
        .lines(hours_lines(request))
        .line(format!("Total Hours: {}", request.total_hours().normalize()))
        .line(format!("Remarks: {}", request.remarks))
        .line(format!("Approved by: {}", request.supervisor_name().unwrap_or("not yet approved")))
        .line(format!("Time: {}", request.submitted_at.format("%Y-%m-%d %H:%M:%S")))
        .button_row(decision_row(ApprovalStage::Operations, request))
        .build()
}

pub fn requester_approved_message(
    request: &LeaveRequest,
    operations: &str,
    new_balance: Decimal,
) -> MessageTemplate {
    MessageBuilder::new("✅ Your leave request has been fully approved!")
        .line(format!("Dates: {}", request.span))
        .line("Hours:")
        .lines(hours_lines(request))
        .line(format!("Total hours: {}", request.total_hours().normalize()))
        .line("Approved by:")
        .line(format!("Supervisor: {}", request.supervisor_name().unwrap_or("n/a")))
        .line(format!("{}: {operations}", ApprovalStage::Operations.label()))
        .line(format!("Updated leave balance: {} hours", new_balance.normalize()))
        .build()
}

pub fn requester_rejected_message(request: &LeaveRequest, stage: ApprovalStage) -> MessageTemplate {
    MessageBuilder::new(format!("❌ Your leave request has been rejected by {}.", stage.label()))
        .line(format!("Dates: {}", request.span))
        .build()
}

/// Replaces the approver's copy of the request once an action went through.
pub fn approver_outcome_message(outcome: &ApprovalOutcome) -> MessageTemplate {
    match outcome {
        ApprovalOutcome::SupervisorApproved { request_id } => {
            MessageBuilder::new("✅ Leave request approved by supervisor.")
                .line(format!("Waiting for {} approval.", ApprovalStage::Operations.label()))
                .line(format!("Request ID: {request_id}"))
                .build()
        }
        ApprovalOutcome::FullyApproved { request_id, total_hours, new_balance } => {
            MessageBuilder::new("✅ Leave request fully approved and processed.")
                .line(format!(
                    "Debited {} hours, new balance {} hours.",
                    total_hours.normalize(),
                    new_balance.normalize()
                ))
                .line(format!("Request ID: {request_id}"))
                .build()
        }
        ApprovalOutcome::Rejected { request_id, stage } => {
            MessageBuilder::new(format!("❌ Leave request rejected by {}.", stage.label()))
                .line(format!("Request ID: {request_id}"))
                .build()
        }
    }
}

pub fn approval_refused_message(error: &ApprovalError) -> MessageTemplate {
    let headline = match error {
        ApprovalError::NotFound { .. } => "Error: Request not found or already processed.".to_owned(),
        ApprovalError::AlreadySupervisorApproved { supervisor, .. } => {
            format!("This request was already approved by supervisor {supervisor}.")
        }
        ApprovalError::AwaitingSupervisor { .. } => {
            "This request is awaiting supervisor approval.".to_owned()
        }
        ApprovalError::RequesterNotInLedger { .. } => {
            "❌ Error: requester not found in balance ledger.".to_owned()
        }
        ApprovalError::Ledger { .. } => "❌ Error processing approval.".to_owned(),
    };
    MessageBuilder::new(headline).line(format!("Request ID: {}", error.request_id())).build()
}

pub fn invalid_callback_message() -> MessageTemplate {
    MessageTemplate::plain("Error: invalid callback data.")
}

pub fn balance_report_message(report: &BalanceReport) -> MessageTemplate {
    let builder = MessageBuilder::new("📊 Leave Balance Information")
        .blank()
        .line(format!("Current Balance: {:.1} hours", report.balance))
        .line(format!("Hours taken this month: {:.1} hours", report.hours_taken()))
        .blank();

    if report.records.is_empty() {
        return builder.line("No leave taken this month.").build();
    }

    let history = report.records.iter().flat_map(|record| {
        [
            format!(
                "- {} to {}: {} hours",
                record.start_date,
                record.end_date,
                record.total_hours.normalize()
            ),
            format!("  Remarks: {}", record.remarks),
        ]
    });
    builder.line("Recent Leave History (This Month):").lines(history).build()
}

pub fn balance_not_found_message() -> MessageTemplate {
    MessageBuilder::new("❌ Error: Your Telegram ID is not found in the system.")
        .line("Please contact your administrator.")
        .build()
}

/// User-safe text for a failure below the handler boundary.
pub fn failure_message(error: &InterfaceError, request_id: Option<&str>) -> MessageTemplate {
    let builder = MessageBuilder::new(format!("❌ {}", error.user_message()));
    let builder = match request_id {
        Some(request_id) => builder.line(format!("Request ID: {request_id}")),
        None => builder,
    };
    builder.line(format!("Reference: {}", error.correlation_id())).build()
}
