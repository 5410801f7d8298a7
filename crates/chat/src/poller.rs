use std::{sync::Arc, time::Duration};

use leaveflow_core::errors::InterfaceError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{DispatchError, EventContext, EventDispatcher, HandlerResult, Update};
use crate::messages::{self, MessageTemplate};
use crate::transport::{ChatTransport, TransportError, UpdateSource};

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("update polling failed {attempts} times in a row: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: TransportError },
}

/// Backoff for failed polls. `max_retries: None` keeps retrying forever;
/// failure streaks longer than `alert_after` are logged at error level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: Option<u32>,
    pub alert_after: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: None, alert_after: 8, base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Pulls update batches and handles them strictly one at a time.
pub struct UpdatePoller {
    source: Arc<dyn UpdateSource>,
    transport: Arc<dyn ChatTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl UpdatePoller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        transport: Arc<dyn ChatTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, transport, dispatcher, reconnect_policy }
    }

    /// Runs until the source closes. Consecutive polling failures back off and
    /// only give up when `max_retries` is set; a successful poll resets the count.
    pub async fn run(&self) -> Result<(), PollerError> {
        let mut offset = None;
        let mut failures = 0_u32;

        loop {
            let batch = match self.source.next_batch(offset).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    info!(event_name = "ingress.poller.closed", "update source closed");
                    return Ok(());
                }
                Err(transport_error) => {
                    if failures >= self.reconnect_policy.alert_after {
                        error!(
                            event_name = "ingress.poller.poll_outage",
                            attempt = failures,
                            error = %transport_error,
                            "polling for updates keeps failing; still retrying"
                        );
                    } else {
                        warn!(
                            event_name = "ingress.poller.poll_failed",
                            attempt = failures,
                            error = %transport_error,
                            "polling for updates failed"
                        );
                    }
                    if self.reconnect_policy.max_retries.is_some_and(|max| failures >= max) {
                        return Err(PollerError::RetriesExhausted {
                            attempts: failures + 1,
                            last_error: transport_error,
                        });
                    }

                    let delay = self.reconnect_policy.backoff(failures);
                    failures = failures.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };
            failures = 0;

            for update in batch {
                offset = Some(update.update_id + 1);
                self.handle_update(&update).await;
            }
        }
    }

    async fn handle_update(&self, update: &Update) {
        let context = EventContext::for_update(update.update_id);
        info!(
            event_name = "ingress.update_received",
            correlation_id = %context.correlation_id,
            event_type = ?update.event.event_type(),
            user_id = update.sender_id().map(|id| id.0),
            "received chat update"
        );

        match self.dispatcher.dispatch(update, &context).await {
            Ok(HandlerResult::Responded(message)) => self.reply(update, &context, &message).await,
            Ok(HandlerResult::Processed) => {
                debug!(correlation_id = %context.correlation_id, "update processed");
            }
            Ok(HandlerResult::Ignored) => {
                debug!(correlation_id = %context.correlation_id, "update ignored");
            }
            Err(DispatchError::Handler(handler_error)) => {
                error!(
                    event_name = "ingress.handler_failed",
                    correlation_id = %context.correlation_id,
                    error = %handler_error,
                    "event handler failed; continuing"
                );
                let failure = InterfaceError::Internal {
                    message: handler_error.to_string(),
                    correlation_id: context.correlation_id.clone(),
                };
                self.reply(update, &context, &messages::failure_message(&failure, None)).await;
            }
        }
    }

    async fn reply(&self, update: &Update, context: &EventContext, message: &MessageTemplate) {
        let Some(chat_id) = update.reply_chat() else {
            return;
        };
        if let Err(transport_error) = self.transport.send_message(chat_id, message).await {
            warn!(
                event_name = "egress.reply_failed",
                correlation_id = %context.correlation_id,
                chat_id = chat_id.0,
                error = %transport_error,
                "failed to deliver reply"
            );
        }
    }
}
